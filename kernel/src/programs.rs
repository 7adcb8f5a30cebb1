//! Program images embedded at build time.
//!
//! Every file in the directory named by `KSPACE_PROGRAMS` becomes one `(file name, image)`
//! entry. The list is empty when the variable is unset.

include!(concat!(env!("OUT_DIR"), "/programs.rs"));
