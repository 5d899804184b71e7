pub mod config;
pub mod context;
pub mod pipeline;
pub mod policy;
pub mod redacted;
pub mod remote;
pub mod restore;
pub mod result_error;
pub mod state;
pub mod store;
pub mod uploader;
pub mod validate;

#[cfg(test)]
pub(crate) mod testutil;

macro_rules! function_path {
    () => {
        concat!(module_path!(), "::", function_name!(), " ", file!(), ":", line!())
    };
}

pub(crate) use function_path;
