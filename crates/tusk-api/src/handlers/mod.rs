mod uploads;

pub use uploads::{
    append_chunk, create_upload, terminate_upload, upload_capabilities, upload_info,
};
