//! End-to-end scenario tests (save → mispredict → rollback → verify)
//!
//! These drive a [`crate::test_utils::TestGame`] through the public
//! session API the way a transport-owning caller would.
