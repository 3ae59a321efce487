//! Positional and value-level I/O.
//!
//! [`DataReader`] abstracts random access to an archive (local file or HTTP
//! range source); [`ValueReaderSlice`]/[`ValueWriterBlob`] read and write the
//! little-endian scalars, varints and protobuf fields used by the archive
//! directory format and the vector-tile codec.

mod data_reader;
mod data_reader_file;
mod data_reader_http;
mod value_reader;
mod value_writer;

pub use data_reader::{DataReader, DataReaderTrait};
pub use data_reader_file::DataReaderFile;
pub use data_reader_http::DataReaderHttp;
pub use value_reader::ValueReaderSlice;
pub use value_writer::ValueWriterBlob;
