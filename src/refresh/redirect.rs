//! Re-authentication signal raised when the session cannot be recovered.

/// Host hook that sends the user back to the sign-in view.
pub trait LoginRedirect
where
	Self: Send + Sync,
{
	/// Returns `true` while the unauthenticated landing view is already showing.
	fn is_on_login_view(&self) -> bool;

	/// Navigates to the sign-in view.
	fn redirect_to_login(&self);
}

/// Redirect handler for headless hosts; never redirects.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRedirect;
impl LoginRedirect for NoopRedirect {
	fn is_on_login_view(&self) -> bool {
		false
	}

	fn redirect_to_login(&self) {}
}
