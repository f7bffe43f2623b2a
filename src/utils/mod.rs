/// 工具模块 - 提供通用工具函数
pub mod logging;
pub mod path;

pub use logging::LoggingConfig;
pub use path::{ensure_parent_dir, generate_path};
