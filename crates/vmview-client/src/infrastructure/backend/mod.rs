//! Display backend implementations.
//!
//! Bindings to real display libraries plug in here.  The mock backend records
//! every call and can script the events a remote display would raise.

pub mod mock;
