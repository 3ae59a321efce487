use crate::{Blob, ByteRange};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// Type alias for a boxed dynamic implementation of [`DataReaderTrait`].
pub type DataReader = Box<dyn DataReaderTrait>;

/// Random access to the bytes of an archive.
///
/// Implementations read specific byte ranges without consuming the source, so
/// a reader can be shared across concurrent tile requests.
#[async_trait]
pub trait DataReaderTrait: Debug + Send + Sync {
	/// Reads the given range of bytes.
	async fn read_range(&self, range: &ByteRange) -> Result<Blob>;

	/// Name of the data source, for log and error messages.
	fn get_name(&self) -> &str;
}
