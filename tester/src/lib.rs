pub mod aggregate;
pub mod cases;
pub mod config;
pub mod gather;
pub mod logging;
pub mod numfmt;
pub mod table;
