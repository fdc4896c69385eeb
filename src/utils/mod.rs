//! 工具模块

pub mod config;
