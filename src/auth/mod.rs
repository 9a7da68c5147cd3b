// Authentication module
// Manages the token lifecycle and the authenticated request path

mod clock;
mod context;
mod response;
mod types;

pub use clock::{Clock, SystemClock};
pub use context::{AuthContext, TOKEN_PATH};
pub use response::{normalize, ServerResponse, NO_DATA_MESSAGE};
pub use types::{Credentials, Grant, TokenResponse, TokenState};

#[cfg(any(test, feature = "test-utils"))]
pub use clock::ManualClock;
