use crate::error::{MmToolsError, Result};
use std::env;

/// 远程推理服务地址
pub const REMOTE_ENDPOINT_ENV: &str = "MMTOOLS_REMOTE_ENDPOINT";
/// 远程推理服务令牌
pub const REMOTE_TOKEN_ENV: &str = "MMTOOLS_REMOTE_TOKEN";

/// 环境变量配置管理
pub struct EnvConfig;

impl EnvConfig {
    /// 获取 API Key，支持从环境变量或配置中获取
    ///
    /// 优先级：
    /// 1. `${VAR_NAME}` 格式时读取对应环境变量
    /// 2. 空字符串时读取 default_env_var
    /// 3. 其余情况直接使用传入值
    pub fn get_api_key(api_key: &str, default_env_var: &str) -> Result<String> {
        if let Some(name) = api_key
            .strip_prefix("${")
            .and_then(|rest| rest.strip_suffix('}'))
        {
            Self::get_env(name)
        } else if api_key.is_empty() {
            Self::get_env(default_env_var)
        } else {
            Ok(api_key.to_string())
        }
    }

    /// 从环境变量获取值
    pub fn get_env(key: &str) -> Result<String> {
        env::var(key)
            .map_err(|_| MmToolsError::Config(format!("environment variable `{key}` is not set")))
    }

    /// 获取可选的环境变量
    pub fn get_env_optional(key: &str) -> Option<String> {
        env::var(key).ok().filter(|v| !v.is_empty())
    }

    /// 远程推理服务地址（未设置时为 None）
    pub fn remote_endpoint() -> Option<String> {
        Self::get_env_optional(REMOTE_ENDPOINT_ENV)
    }

    /// 远程推理令牌（未设置时为 None）
    pub fn remote_token() -> Option<String> {
        Self::get_env_optional(REMOTE_TOKEN_ENV)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_api_key_direct() {
        let result = EnvConfig::get_api_key("tok-1234567890abcdef", "MMTOOLS_TEST_KEY");
        assert_eq!(result.unwrap(), "tok-1234567890abcdef");
    }

    #[test]
    fn test_get_api_key_env_var() {
        env::set_var("MMTOOLS_TEST_TOKEN_A", "test_key_value");
        let result = EnvConfig::get_api_key("${MMTOOLS_TEST_TOKEN_A}", "FALLBACK_KEY");
        assert_eq!(result.unwrap(), "test_key_value");
        env::remove_var("MMTOOLS_TEST_TOKEN_A");
    }

    #[test]
    fn test_get_api_key_empty_uses_default() {
        env::set_var("MMTOOLS_TEST_TOKEN_B", "default_value");
        let result = EnvConfig::get_api_key("", "MMTOOLS_TEST_TOKEN_B");
        assert_eq!(result.unwrap(), "default_value");
        env::remove_var("MMTOOLS_TEST_TOKEN_B");
    }

    #[test]
    fn test_get_env_missing_is_config_error() {
        let err = EnvConfig::get_env("MMTOOLS_TEST_DEFINITELY_UNSET").unwrap_err();
        assert!(matches!(err, MmToolsError::Config(_)));
    }
}
