//! Signs in against a mock API with the default reqwest transport, refreshes the expiring
//! access token, and sends an authorized call with the rotated token.

// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
// self
use session_guard::{
	client::ApiCall,
	config::SessionConfig,
	session::{LoginRequest, SessionBuilder},
	url::Url,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let login_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"demo-access\",\"refresh_token\":\"demo-refresh\",\"expires_in\":60,\"user\":{\"id\":1,\"name\":\"Ada\"}}",
			);
		})
		.await;
	let _refresh_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).header("content-type", "application/json").body(
				"{\"data\":{\"session\":{\"access_token\":\"demo-rotated\",\"expires_in\":3600}}}",
			);
		})
		.await;
	let images_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/images").header("authorization", "Bearer demo-rotated");
			then.status(200).header("content-type", "application/json").body("[]");
		})
		.await;
	let config = SessionConfig::builder(Url::parse(&server.base_url())?).build()?;
	let session = SessionBuilder::with_reqwest(config)?.build()?;
	let user = session.login(&LoginRequest::new("ada@example.com", "hunter2")).await?;

	println!("Signed in as {user:?}; session status: {:?}.", session.status());

	// The 60 second lifetime sits inside the refresh buffer.
	let refreshed = session.refresher().refresh_if_needed().await;

	println!("Token refreshed: {refreshed}.");

	let response = session.request(ApiCall::get("images")).await?.error_for_status()?;

	println!("Images call answered {}.", response.status);

	session.logout().await;
	login_mock.assert_async().await;
	images_mock.assert_async().await;

	Ok(())
}
