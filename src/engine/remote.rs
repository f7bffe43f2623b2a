use std::path::PathBuf;

use crate::error::Result;

/// 远程推理的位置参数
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RemoteArg {
    Path(PathBuf),
    Text(String),
}

/// 托管推理服务：按模型键和有序参数调用，返回原始字节
pub trait RemoteInference: Send + Sync {
    fn inference(&self, key: &str, args: &[RemoteArg]) -> Result<Vec<u8>>;
}

#[cfg(feature = "remote-client")]
mod http {
    use std::time::Duration;

    use reqwest::blocking::{multipart::Form, Client};
    use tracing::debug;

    use super::{RemoteArg, RemoteInference};
    use crate::config::env::{EnvConfig, REMOTE_ENDPOINT_ENV, REMOTE_TOKEN_ENV};
    use crate::error::{MmToolsError, Result};

    /// 基于 HTTP multipart 的远程推理客户端
    ///
    /// 请求 `POST <endpoint>/<key>`，参数依次放在 `arg0..argN` 字段中，
    /// 路径参数以文件上传，其余以文本上传。
    pub struct HttpRemoteInference {
        client: Client,
        endpoint: String,
        token: Option<String>,
    }

    impl HttpRemoteInference {
        pub fn new(endpoint: impl Into<String>) -> Result<Self> {
            let client = Client::builder()
                .timeout(None::<Duration>)
                .build()
                .map_err(|e| MmToolsError::Config(format!("failed to build http client: {e}")))?;
            Ok(Self {
                client,
                endpoint: endpoint.into().trim_end_matches('/').to_string(),
                token: None,
            })
        }

        /// 从 `MMTOOLS_REMOTE_ENDPOINT` / `MMTOOLS_REMOTE_TOKEN` 读取配置
        pub fn from_env() -> Result<Self> {
            let endpoint = EnvConfig::get_env(REMOTE_ENDPOINT_ENV)?;
            let client = Self::new(endpoint)?;
            Ok(match EnvConfig::remote_token() {
                Some(token) => client.with_token(token),
                None => client,
            })
        }

        /// 支持 `${VAR}` 形式，空字符串时读取 `MMTOOLS_REMOTE_TOKEN`
        pub fn with_api_key(self, api_key: &str) -> Result<Self> {
            let token = EnvConfig::get_api_key(api_key, REMOTE_TOKEN_ENV)?;
            Ok(self.with_token(token))
        }

        pub fn with_token(mut self, token: impl Into<String>) -> Self {
            self.token = Some(token.into());
            self
        }

        fn form(args: &[RemoteArg]) -> Result<Form> {
            let mut form = Form::new();
            for (index, arg) in args.iter().enumerate() {
                let name = format!("arg{index}");
                form = match arg {
                    RemoteArg::Text(text) => form.text(name, text.clone()),
                    RemoteArg::Path(path) => form
                        .file(name, path)
                        .map_err(|e| MmToolsError::io(path.clone(), e))?,
                };
            }
            Ok(form)
        }
    }

    impl RemoteInference for HttpRemoteInference {
        fn inference(&self, key: &str, args: &[RemoteArg]) -> Result<Vec<u8>> {
            let url = format!("{}/{}", self.endpoint, key);
            debug!(%url, args = args.len(), "remote inference request");

            let mut request = self.client.post(&url).multipart(Self::form(args)?);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().map_err(|e| MmToolsError::Remote {
                key: key.to_string(),
                reason: format!("request failed: {e}"),
            })?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().unwrap_or_default();
                return Err(MmToolsError::Remote {
                    key: key.to_string(),
                    reason: format!("HTTP {status}: {body}"),
                });
            }

            let bytes = response.bytes().map_err(|e| MmToolsError::Remote {
                key: key.to_string(),
                reason: format!("failed to read response: {e}"),
            })?;
            Ok(bytes.to_vec())
        }
    }
}

#[cfg(feature = "remote-client")]
pub use http::HttpRemoteInference;
