//! Integration tests for the Karst kernel.
//!
//! These tests drive the public API end to end: building chains through a
//! [`karst_chain::ChainstateManager`], spending coins with real signatures,
//! and replaying block files after wipes. Shared builders live in
//! [`helpers`].

pub mod helpers;
