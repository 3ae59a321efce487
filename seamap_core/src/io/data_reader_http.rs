//! Reading byte ranges from an HTTP(S) endpoint.
//!
//! Every read issues a `Range: bytes=a-b` request and validates the
//! `Content-Range` of the `206` response, so a misbehaving server cannot
//! silently hand back the wrong slice of an archive.

use super::DataReaderTrait;
use crate::{Blob, ByteRange};
use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use reqwest::{Client, Method, Request, StatusCode, Url};
use std::time::Duration;

/// Byte-range reads from an HTTP(S) URL.
#[derive(Debug)]
pub struct DataReaderHttp {
	client: Client,
	name: String,
	url: Url,
}

impl DataReaderHttp {
	pub fn from_url(url: Url) -> Result<DataReaderHttp> {
		match url.scheme() {
			"http" | "https" => (),
			_ => bail!("url has wrong scheme {url}"),
		}

		let client = Client::builder()
			.tcp_keepalive(Duration::from_secs(600))
			.connect_timeout(Duration::from_secs(20))
			.build()?;

		Ok(DataReaderHttp {
			client,
			name: url.to_string(),
			url,
		})
	}
}

#[async_trait]
impl DataReaderTrait for DataReaderHttp {
	async fn read_range(&self, range: &ByteRange) -> Result<Blob> {
		let ctx = || format!("while reading range {range} of {}", self.url);

		let mut request = Request::new(Method::GET, self.url.clone());
		let request_range = format!("bytes={}-{}", range.offset, range.offset + range.length - 1);
		request
			.headers_mut()
			.append("range", request_range.parse().with_context(ctx)?);

		let response = self.client.execute(request).await.with_context(ctx)?;

		if response.status() != StatusCode::PARTIAL_CONTENT {
			bail!(
				"expected 206 as a response to a range request, got {}, {}",
				response.status(),
				ctx()
			);
		}

		let content_range = match response.headers().get("content-range") {
			Some(header_value) => header_value.to_str().with_context(ctx)?,
			None => bail!("content-range header is not set in response headers, {}", ctx()),
		};

		lazy_static! {
			static ref RE_RANGE: Regex = RegexBuilder::new(r"^bytes (\d+)-(\d+)/\d+$")
				.case_insensitive(true)
				.build()
				.unwrap();
		}

		let (start, end) = {
			let caps = RE_RANGE
				.captures(content_range)
				.ok_or_else(|| anyhow!("invalid content-range header: {content_range}"))
				.with_context(ctx)?;
			(caps[1].parse::<u64>().with_context(ctx)?, caps[2].parse::<u64>().with_context(ctx)?)
		};

		if start != range.offset {
			bail!("content-range start {start} is not the start of the requested range, {}", ctx());
		}
		if end != range.offset + range.length - 1 {
			bail!("content-range end {end} is not the end of the requested range, {}", ctx());
		}

		let bytes = response.bytes().await.with_context(ctx)?;
		Ok(Blob::from(bytes.as_ref()))
	}

	fn get_name(&self) -> &str {
		&self.name
	}
}
