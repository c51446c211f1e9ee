//! 配置管理
//!
//! 配置按“默认值 -> TOML文件 -> 环境变量”的顺序叠加，
//! 每个配置段都提供 `validate()` 校验。

pub mod models;

#[cfg(test)]
mod tests;

pub use models::*;
