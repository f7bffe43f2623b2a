use std::env;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 调试模式环境变量
pub const DEBUG_ENV: &str = "MMTOOLS_DEBUG";

/// 日志配置
pub struct LoggingConfig;

impl LoggingConfig {
    /// 初始化日志系统
    ///
    /// 支持通过环境变量配置：
    /// - RUST_LOG: 设置日志级别（error, warn, info, debug, trace）
    /// - MMTOOLS_DEBUG: 启用详细调试输出
    ///
    /// 重复调用不会 panic，第二次起直接忽略。
    pub fn init() {
        let is_debug = Self::is_debug();

        let env_filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => {
                if is_debug {
                    EnvFilter::new("mmtools=debug,info")
                } else {
                    EnvFilter::new("mmtools=info,warn")
                }
            }
        };

        let fmt_layer = fmt::layer()
            .with_target(is_debug)
            .with_file(is_debug)
            .with_line_number(is_debug)
            .with_thread_ids(is_debug);

        let installed = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .is_ok();

        if installed && is_debug {
            tracing::debug!("调试模式已启用");
        }
    }

    /// 初始化日志系统（带自定义过滤器）
    pub fn init_with_filter(filter: &str) {
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new(filter))
            .with(fmt::layer())
            .try_init();
    }

    /// 检查是否启用调试模式
    pub fn is_debug() -> bool {
        env::var(DEBUG_ENV).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_debug() {
        env::remove_var(DEBUG_ENV);
        assert!(!LoggingConfig::is_debug());

        env::set_var(DEBUG_ENV, "1");
        assert!(LoggingConfig::is_debug());

        env::remove_var(DEBUG_ENV);
    }

    #[test]
    fn test_init_twice_does_not_panic() {
        LoggingConfig::init_with_filter("mmtools=trace");
        LoggingConfig::init();
    }
}
