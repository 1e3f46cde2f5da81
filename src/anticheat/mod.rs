//! Anti-cheat: validation of client-reported movement state
//!
//! Clients are authoritative about nothing; every turn claim is checked
//! against the server's own simulation before it is adopted.

pub mod validator;
