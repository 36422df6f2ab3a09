//! Shared test helpers

pub mod db_utils;
