pub mod init;
pub mod attention;
pub mod model;
pub mod loss;
pub mod schedule;
pub mod executor;
pub mod trainer;
pub mod generator;
