mod assemble;
mod backends;
mod convert;
mod decode;
mod era5;
mod error;
mod executor;
mod registry;
mod scratch;
mod time_select;
mod types;

pub use era5::Era5;
pub use error::{ConfigError, Era5Error};

pub use backends::aws::accessor::AwsAccessor;
pub use backends::aws::error::AwsError;
pub use backends::aws::store::{HttpObjectReader, ObjectReader, ERA5_PDS_ENDPOINT};
pub use backends::cds::accessor::CdsAccessor;
pub use backends::cds::client::{CdsHttpClient, CdsTransport, RemoteFile, DEFAULT_CDS_URL};
pub use backends::cds::error::CdsError;
pub use backends::cds::request::CdsPayload;

pub use convert::to_dataframe;
pub use decode::{decode_time_axis, default_decoder, DatasetDecoder, DecodeError, FileFormat};
pub use executor::{fetch_all, BatchOutcome};
pub use registry::{AccessorRegistry, DataAccessor};
pub use scratch::sweep_scratch_files;
pub use time_select::{HourSelection, VALID_HOUR_STEPS};

pub use types::bounding_box::{BoundingBox, STATION_MARGIN_DEG};
pub use types::dataset::{
    DatasetAttrs, Era5Dataset, GridDataset, GridField, StationDataset, StationField, EPSG_WGS84,
};
pub use types::request::{DataRequest, RetrievalOptions, StationPoint};
