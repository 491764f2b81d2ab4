//! Share validation: turning a submitted nonce into accept/reject, and
//! driving block-submission side effects.

pub mod validator;

pub use validator::ShareValidator;
