// Each test binary uses a different subset of these helpers
#![allow(dead_code)]

pub mod db;
pub mod helpers;
