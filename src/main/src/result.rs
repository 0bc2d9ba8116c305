use std::{fmt::Debug, path::PathBuf};

use camelpaste::paste;
use thiserror::Error;
use tokio::task::JoinError;

pub type ZmResult<T> = Result<T, ZmError>;

#[derive(Debug)]
pub enum ZmNetworkErr {
    ClientBuild(reqwest::Error),
    Http {
        host: String,
        err: reqwest::Error,
    },
    BadStatus {
        host: String,
        status: u16,
        body: String,
    },
    NodeIndexOutOfRange {
        index: usize,
        len: usize,
    },
    HttpBind {
        addr: String,
        err: hyper::Error,
    },
}

#[derive(Debug)]
pub enum ZmSerialErr {
    ReportDecode(serde_json::Error),
    ReportNotObject {
        found: &'static str,
    },
    YamlDecode {
        err: serde_yaml::Error,
        context: String,
    },
    YamlEncode(serde_yaml::Error),
}

#[derive(Debug)]
pub enum ZmIoErr {
    Io(std::io::Error),
    OpenFile { path: PathBuf, err: std::io::Error },
}

#[derive(Debug)]
pub enum ZmConfigErr {
    EmptySchemaCatalog,
    DuplicateSchemaVersion(String),
    InvalidHttpAddr(String),
    MetricNotFound(String),
}

#[derive(Debug)]
pub enum ZmRuntimeErr {
    TokioJoin { err: JoinError, context: String },
}

#[derive(Error, Debug)]
pub enum ZmError {
    #[error("Network error: {0:?}")]
    ZmNetworkErr(ZmNetworkErr),

    #[error("Serial error: {0:?}")]
    ZmSerialErr(ZmSerialErr),

    #[error("Io error: {0:?}")]
    ZmIoErr(ZmIoErr),

    #[error("Config error: {0:?}")]
    ZmConfigErr(ZmConfigErr),

    #[error("Runtime error: {0:?}")]
    ZmRuntimeErr(ZmRuntimeErr),
}

impl From<ZmNetworkErr> for ZmError {
    fn from(e: ZmNetworkErr) -> Self {
        ZmError::ZmNetworkErr(e)
    }
}

impl From<ZmSerialErr> for ZmError {
    fn from(e: ZmSerialErr) -> Self {
        ZmError::ZmSerialErr(e)
    }
}

impl From<ZmIoErr> for ZmError {
    fn from(e: ZmIoErr) -> Self {
        ZmError::ZmIoErr(e)
    }
}

impl From<ZmConfigErr> for ZmError {
    fn from(e: ZmConfigErr) -> Self {
        ZmError::ZmConfigErr(e)
    }
}

impl From<ZmRuntimeErr> for ZmError {
    fn from(e: ZmRuntimeErr) -> Self {
        ZmError::ZmRuntimeErr(e)
    }
}

impl From<std::io::Error> for ZmError {
    fn from(e: std::io::Error) -> Self {
        ZmError::ZmIoErr(ZmIoErr::Io(e))
    }
}

impl From<serde_json::Error> for ZmError {
    fn from(e: serde_json::Error) -> Self {
        ZmError::ZmSerialErr(ZmSerialErr::ReportDecode(e))
    }
}

pub struct ErrCvt<T>(pub T);

macro_rules! impl_err_convertor {
    ($t:ty,$sub_t:ident,$sub_tt:ident) => {
        paste! {
            impl ErrCvt<$t> {
                pub fn [<to_ $sub_t:snake>](self) -> ZmError {
                    ZmError::$sub_t($sub_t::$sub_tt(self.0))
                }
            }
        }
    };
}

impl_err_convertor!(serde_json::Error, ZmSerialErr, ReportDecode);
impl_err_convertor!(serde_yaml::Error, ZmSerialErr, YamlEncode);
impl_err_convertor!(std::io::Error, ZmIoErr, Io);
impl_err_convertor!(reqwest::Error, ZmNetworkErr, ClientBuild);

pub trait ZmResultExt {
    fn todo_handle(&self);
}

impl<T: Debug> ZmResultExt for ZmResult<T> {
    #[inline]
    fn todo_handle(&self) {
        match self {
            Ok(_ok) => {}
            Err(err) => {
                tracing::warn!("result err: {:?}", err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_err_convertor_wraps_category() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        let err = ErrCvt(io).to_zm_io_err();
        assert!(matches!(err, ZmError::ZmIoErr(ZmIoErr::Io(_))));

        let json = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ErrCvt(json).to_zm_serial_err();
        assert!(matches!(
            err,
            ZmError::ZmSerialErr(ZmSerialErr::ReportDecode(_))
        ));
    }

    #[test]
    fn test_display_names_category() {
        let err: ZmError = ZmConfigErr::MetricNotFound("latency".to_owned()).into();
        assert!(err.to_string().starts_with("Config error"));
        assert!(err.to_string().contains("latency"));
    }
}
