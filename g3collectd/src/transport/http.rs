/*
 * SPDX-License-Identifier: Apache-2.0
 * Copyright 2025 ByteDance and/or its affiliates.
 */

use std::io::Write;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use base64::Engine;
use base64::prelude::BASE64_STANDARD;
use http::uri::PathAndQuery;
use http::{HeaderMap, HeaderName, HeaderValue, StatusCode, Uri, Version};
use tokio::io::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};
use tokio::net::TcpStream;
use yaml_rust::Yaml;

use super::{PayloadMeta, Transport};
use crate::config::yaml;

const DEFAULT_PORT: u16 = 80;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpTransportConfig {
    host: String,
    port: u16,
    path: PathAndQuery,
    user: Option<String>,
    password: Option<String>,
    headers: HeaderMap,
    rsp_head_max_size: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        HttpTransportConfig {
            host: String::new(),
            port: DEFAULT_PORT,
            path: PathAndQuery::from_static("/"),
            user: None,
            password: None,
            headers: HeaderMap::new(),
            rsp_head_max_size: 8192,
        }
    }
}

impl HttpTransportConfig {
    pub fn with_server<S: Into<String>>(host: S, port: u16) -> Self {
        HttpTransportConfig {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn check(&self) -> anyhow::Result<()> {
        if self.host.is_empty() {
            return Err(anyhow!("peer address is not set"));
        }
        if self.password.is_some() && self.user.is_none() {
            return Err(anyhow!("password is set without user"));
        }
        Ok(())
    }

    fn set_url(&mut self, url: &str) -> anyhow::Result<()> {
        let uri = Uri::from_str(url).map_err(|e| anyhow!("invalid url {url}: {e}"))?;
        match uri.scheme_str() {
            Some("http") | None => {}
            Some(s) => return Err(anyhow!("unsupported url scheme {s}")),
        }
        let Some(host) = uri.host() else {
            return Err(anyhow!("no host found in url {url}"));
        };
        // ipv6 literals keep their brackets in the uri
        self.host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        self.port = uri.port_u16().unwrap_or(DEFAULT_PORT);
        if let Some(pq) = uri.path_and_query() {
            self.path = pq.clone();
        }
        Ok(())
    }

    pub(crate) fn set_by_yaml_kv(&mut self, k: &str, v: &Yaml) -> anyhow::Result<()> {
        match yaml::normalize_key(k).as_str() {
            "url" => {
                let url = yaml::as_string(v)?;
                self.set_url(&url)
            }
            "host" | "server" => {
                self.host = yaml::as_string(v)?;
                Ok(())
            }
            "port" => {
                let port = yaml::as_u32(v)?;
                self.port = u16::try_from(port).map_err(|_| anyhow!("invalid port {port}"))?;
                Ok(())
            }
            "path" => {
                let path = yaml::as_string(v)?;
                self.path = PathAndQuery::from_str(&path)
                    .map_err(|e| anyhow!("invalid path {path}: {e}"))?;
                Ok(())
            }
            "user" | "username" => {
                self.user = Some(yaml::as_string(v)?);
                Ok(())
            }
            "password" => {
                self.password = Some(yaml::as_string(v)?);
                Ok(())
            }
            "headers" => {
                let Yaml::Hash(map) = v else {
                    return Err(anyhow!("yaml value type for key {k} should be 'map'"));
                };
                yaml::foreach_kv(map, |name, v| {
                    let name = HeaderName::from_str(name)
                        .map_err(|e| anyhow!("invalid header name {name}: {e}"))?;
                    let value = yaml::as_string(v)?;
                    let value = HeaderValue::from_str(&value)
                        .map_err(|e| anyhow!("invalid header value {value}: {e}"))?;
                    self.headers.append(name, value);
                    Ok(())
                })
            }
            "rsp_header_max_size" => {
                self.rsp_head_max_size = yaml::as_size(v)
                    .context(format!("invalid humanize usize value for key {k}"))?;
                Ok(())
            }
            _ => Err(anyhow!("invalid key {k}")),
        }
    }

    fn write_fixed_header(&self, header_buf: &mut Vec<u8>) {
        header_buf.extend_from_slice(b"POST ");
        header_buf.extend_from_slice(self.path.as_str().as_bytes());
        header_buf.extend_from_slice(b" HTTP/1.1\r\n");
        header_buf.extend_from_slice(b"Host: ");
        if self.host.contains(':') {
            let _ = write!(header_buf, "[{}]", self.host);
        } else {
            header_buf.extend_from_slice(self.host.as_bytes());
        }
        if self.port != DEFAULT_PORT {
            let _ = write!(header_buf, ":{}", self.port);
        }
        header_buf.extend_from_slice(b"\r\n");
        header_buf.extend_from_slice(b"Connection: close\r\n");
        if let Some(user) = &self.user {
            let password = self.password.as_deref().unwrap_or_default();
            let token = BASE64_STANDARD.encode(format!("{user}:{password}"));
            header_buf.extend_from_slice(b"Authorization: Basic ");
            header_buf.extend_from_slice(token.as_bytes());
            header_buf.extend_from_slice(b"\r\n");
        }
        for (header, value) in &self.headers {
            header_buf.extend_from_slice(header.as_str().as_bytes());
            header_buf.extend_from_slice(b": ");
            header_buf.extend_from_slice(value.as_bytes());
            header_buf.extend_from_slice(b"\r\n");
        }
    }
}

/// Send each payload as the body of one HTTP/1.1 POST request.
pub struct HttpTransport {
    config: HttpTransportConfig,
    fixed_header: Vec<u8>,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> Self {
        let mut fixed_header = Vec::with_capacity(256);
        config.write_fixed_header(&mut fixed_header);
        HttpTransport {
            config,
            fixed_header,
        }
    }

    fn build_header(&self, payload_len: usize, meta: &PayloadMeta) -> Vec<u8> {
        let mut header = Vec::with_capacity(self.fixed_header.len() + 128);
        header.extend_from_slice(&self.fixed_header);
        header.extend_from_slice(b"Content-Type: ");
        header.extend_from_slice(meta.content_type.as_bytes());
        header.extend_from_slice(b"\r\n");
        if let Some(encoding) = meta.content_encoding {
            header.extend_from_slice(b"Content-Encoding: ");
            header.extend_from_slice(encoding.as_bytes());
            header.extend_from_slice(b"\r\n");
        }
        let mut len = itoa::Buffer::new();
        header.extend_from_slice(b"Content-Length: ");
        header.extend_from_slice(len.format(payload_len).as_bytes());
        header.extend_from_slice(b"\r\n\r\n");
        header
    }

    async fn post<S>(&self, stream: &mut S, payload: &[u8], meta: &PayloadMeta) -> anyhow::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let header = self.build_header(payload.len(), meta);
        stream
            .write_all(&header)
            .await
            .context("failed to write request header")?;
        stream
            .write_all(payload)
            .await
            .context("failed to write request body")?;
        stream.flush().await.context("failed to flush request")?;

        let status = read_rsp_status(stream, self.config.rsp_head_max_size).await?;
        if status.is_success() {
            Ok(())
        } else {
            Err(anyhow!("peer responded with status {status}"))
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, payload: &[u8], meta: &PayloadMeta) -> anyhow::Result<()> {
        let mut stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .context(format!(
                "failed to connect to {}:{}",
                self.config.host, self.config.port
            ))?;
        self.post(&mut stream, payload, meta).await
    }
}

/// Status line of the peer response, the only part a sink acts on.
#[derive(Debug, PartialEq, Eq)]
struct RspStatusLine {
    version: Version,
    status: StatusCode,
}

impl RspStatusLine {
    fn parse(line: &[u8]) -> anyhow::Result<Self> {
        let line = line.trim_ascii_end();
        let Some(p) = memchr::memchr(b' ', line) else {
            return Err(anyhow!("no delimiter found in response status line"));
        };
        let version = match &line[..p] {
            b"HTTP/1.0" => Version::HTTP_10,
            b"HTTP/1.1" => Version::HTTP_11,
            v => {
                return Err(anyhow!(
                    "unsupported response version {}",
                    String::from_utf8_lossy(v)
                ));
            }
        };
        let left = &line[p + 1..];
        let code = left
            .get(..3)
            .ok_or_else(|| anyhow!("response status line is not long enough"))?;
        if left.get(3).is_some_and(|c| *c != b' ') {
            return Err(anyhow!("invalid response status code"));
        }
        let status = StatusCode::from_bytes(code)
            .map_err(|e| anyhow!("invalid response status code: {e}"))?;
        Ok(RspStatusLine { version, status })
    }
}

/// Read one line within the remaining header budget.
async fn read_head_line<R>(
    reader: &mut R,
    budget: &mut usize,
    buf: &mut Vec<u8>,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
{
    buf.clear();
    let limit = u64::try_from(*budget).unwrap_or(u64::MAX);
    let n = (&mut *reader)
        .take(limit)
        .read_until(b'\n', buf)
        .await
        .context("failed to read response header")?;
    if n == 0 {
        return Err(anyhow!("connection closed before the end of response header"));
    }
    if buf.last() != Some(&b'\n') {
        return if n >= *budget {
            Err(anyhow!("response header is too large"))
        } else {
            Err(anyhow!("connection closed before the end of response header"))
        };
    }
    *budget -= n;
    Ok(())
}

/// Parse the response head and return its status, the body is ignored.
async fn read_rsp_status<R>(reader: &mut R, max_size: usize) -> anyhow::Result<StatusCode>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut budget = max_size;
    let mut line = Vec::with_capacity(256);

    read_head_line(&mut reader, &mut budget, &mut line).await?;
    let status_line = RspStatusLine::parse(&line)?;
    loop {
        read_head_line(&mut reader, &mut budget, &mut line).await?;
        if line.trim_ascii().is_empty() {
            break;
        }
    }
    log::trace!(
        "got response {:?} {}",
        status_line.version,
        status_line.status
    );
    Ok(status_line.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::io::Builder;

    fn meta() -> PayloadMeta {
        PayloadMeta {
            content_type: "application/json",
            content_encoding: None,
        }
    }

    #[test]
    fn parse_url() {
        let mut config = HttpTransportConfig::default();
        config
            .set_by_yaml_kv("url", &Yaml::String("http://127.0.0.1:8428/write?db=x".to_string()))
            .unwrap();
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8428);
        assert_eq!(config.path.as_str(), "/write?db=x");
        config.check().unwrap();

        let mut config = HttpTransportConfig::default();
        assert!(
            config
                .set_by_yaml_kv("url", &Yaml::String("https://example.net/".to_string()))
                .is_err()
        );
        assert!(config.check().is_err());
    }

    #[tokio::test]
    async fn post_ok() {
        let transport = HttpTransport::new(HttpTransportConfig::with_server("example.net", 8080));
        let mut stream = Builder::new()
            .write(
                b"POST / HTTP/1.1\r\n\
                Host: example.net:8080\r\n\
                Connection: close\r\n\
                Content-Type: application/json\r\n\
                Content-Length: 4\r\n\r\n",
            )
            .write(b"{}\n\n")
            .read(b"HTTP/1.1 204 No Content\r\n")
            .read(b"Server: test\r\n\r\n")
            .build();
        transport.post(&mut stream, b"{}\n\n", &meta()).await.unwrap();
    }

    #[tokio::test]
    async fn post_auth_encoding() {
        let mut config = HttpTransportConfig::with_server("example.net", 80);
        config
            .set_by_yaml_kv("user", &Yaml::String("u".to_string()))
            .unwrap();
        config
            .set_by_yaml_kv("password", &Yaml::String("p".to_string()))
            .unwrap();
        let transport = HttpTransport::new(config);
        let meta = PayloadMeta {
            content_type: "text/plain",
            content_encoding: Some("gzip"),
        };
        let mut stream = Builder::new()
            .write(
                b"POST / HTTP/1.1\r\n\
                Host: example.net\r\n\
                Connection: close\r\n\
                Authorization: Basic dTpw\r\n\
                Content-Type: text/plain\r\n\
                Content-Encoding: gzip\r\n\
                Content-Length: 1\r\n\r\n",
            )
            .write(b"x")
            .read(b"HTTP/1.1 200 OK\r\n\r\n")
            .build();
        transport.post(&mut stream, b"x", &meta).await.unwrap();
    }

    #[tokio::test]
    async fn post_rejected() {
        let transport = HttpTransport::new(HttpTransportConfig::with_server("example.net", 80));
        let mut stream = Builder::new()
            .write(
                b"POST / HTTP/1.1\r\n\
                Host: example.net\r\n\
                Connection: close\r\n\
                Content-Type: application/json\r\n\
                Content-Length: 1\r\n\r\n",
            )
            .write(b"x")
            .read(b"HTTP/1.1 500 Internal Server Error\r\n\r\n")
            .build();
        let e = transport.post(&mut stream, b"x", &meta()).await.unwrap_err();
        assert!(e.to_string().contains("500"));
    }

    #[test]
    fn parse_ipv6_url() {
        let mut config = HttpTransportConfig::default();
        config
            .set_by_yaml_kv("url", &Yaml::String("http://[::1]:8428/api/v1/import".to_string()))
            .unwrap();
        assert_eq!(config.host, "::1");
        assert_eq!(config.port, 8428);

        let mut header = Vec::new();
        config.write_fixed_header(&mut header);
        let header = String::from_utf8(header).unwrap();
        assert!(header.contains("Host: [::1]:8428\r\n"));
    }

    #[test]
    fn status_line() {
        let line = RspStatusLine::parse(b"HTTP/1.0 204 No Content\r\n").unwrap();
        assert_eq!(line.version, Version::HTTP_10);
        assert_eq!(line.status, StatusCode::NO_CONTENT);
        let line = RspStatusLine::parse(b"HTTP/1.1 200\r\n").unwrap();
        assert_eq!(line.status, StatusCode::OK);

        assert!(RspStatusLine::parse(b"HTTP/2 200\r\n").is_err());
        assert!(RspStatusLine::parse(b"HTTP/1.1 2000 OK\r\n").is_err());
        assert!(RspStatusLine::parse(b"HTTP/1.1 20\r\n").is_err());
    }

    #[tokio::test]
    async fn rsp_header_too_large() {
        let mut stream = Builder::new()
            .read(b"HTTP/1.1 200 OK\r\nX-Long: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaa\r\n")
            .build();
        assert!(read_rsp_status(&mut stream, 16).await.is_err());

        let mut stream = Builder::new().read(b"HTTP/1.1 20").build();
        assert!(read_rsp_status(&mut stream, 1024).await.is_err());
    }
}
