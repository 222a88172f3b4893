// Each test binary uses its own subset of the helpers
#![allow(dead_code)]

pub mod glb;
#[cfg(feature = "integration-tests")]
pub mod gpu;
