//! Crate-level integration and BDD tests.

mod support;
