//! Infrastructure layer: storage, migrations, configuration and the
//! application services that run every operation in one unit of work.

pub mod config;
pub mod migrations;
pub mod services;
pub mod store;
