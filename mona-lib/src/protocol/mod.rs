//! Wire conventions shared with the Mona backend.
//!
//! # Channel Layout
//!
//! | Channel               | Path Template                                      | Identifier     |
//! |-----------------------|----------------------------------------------------|----------------|
//! | Payment updates       | `/public/paymentUpdate/{transaction_id}.json`      | transaction id |
//! | Transaction messages  | `/public/transaction-messages/{transaction_id}.json` | transaction id |
//! | Custom tab close      | `/public/close_tab.json`                           | none           |
//! | Authentication events | `/public/login_success/authn_{session_id}.json`    | session id     |
//!
//! # Redirects
//!
//! Checkout redirects point at `{pay_host}/{transaction_id}` with the
//! `embedding`, `sdk` and `method` query parameters, plus `loginScope` and
//! `sessionId` when the hosted page may ask the user to authenticate.

mod paths;
mod redirect;

pub use paths::*;
pub use redirect::*;
