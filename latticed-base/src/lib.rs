mod bitmap;
mod error;
mod hostlist;
mod sluid;


pub use bitmap::Bitmap;
pub use error::{
    access_denied, constraint_violation, err, invalid_input, not_found, Error, ErrorKind, Result,
};
pub use hostlist::{compress as hostlist_compress, expand as hostlist_expand};
pub use sluid::{cluster_id_of, seq_of, sluid2str, str2sluid, unix_ms_of, SluidGen};
