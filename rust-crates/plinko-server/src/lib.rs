pub mod app;

pub mod seed;

pub type Result<T, E = anyhow::Error> = std::result::Result<T, E>;
