use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use cadbridge_core::drawing::Drawing;
use thiserror::Error;

mod encoding;
mod reader;
mod writer;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid document structure: {0}")]
    InvalidDocument(String),
}

pub trait DrawingLoader {
    fn load(&self, path: &Path) -> Result<Drawing, IoError>;
}

pub trait DrawingSaver {
    fn save(&self, drawing: &Drawing, path: &Path) -> Result<(), IoError>;
}

/// ASCII DXF 读写入口。
#[derive(Debug, Default, Clone, Copy)]
pub struct DxfFacade;

impl DxfFacade {
    pub fn new() -> Self {
        Self
    }

    /// 从内存中的 DXF 文本解析图纸。
    pub fn parse_str(&self, source: &str) -> Result<Drawing, IoError> {
        reader::DxfParser::new(source)
            .parse()
            .map_err(IoError::from)
    }

    /// 从 DXF 原始字节解析图纸，旧版本文件按 `$DWGCODEPAGE` 解码。
    pub fn parse_bytes(&self, bytes: &[u8]) -> Result<Drawing, IoError> {
        let source = encoding::decode_dxf(bytes)?;
        self.parse_str(&source)
    }

    /// 将图纸编码为 DXF 文本。
    pub fn write_string(&self, drawing: &Drawing) -> Result<String, IoError> {
        let mut buffer = Vec::new();
        writer::DxfWriter::new(&mut buffer)
            .write_drawing(drawing)
            .map_err(|source| IoError::WriteError {
                path: PathBuf::from("<memory>"),
                source,
            })?;
        String::from_utf8(buffer)
            .map_err(|err| IoError::InvalidDocument(format!("DXF 输出不是合法 UTF-8: {err}")))
    }
}

impl DrawingLoader for DxfFacade {
    fn load(&self, path: &Path) -> Result<Drawing, IoError> {
        let bytes = fs::read(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        self.parse_bytes(&bytes)
    }
}

impl DrawingSaver for DxfFacade {
    fn save(&self, drawing: &Drawing, path: &Path) -> Result<(), IoError> {
        let to_write_error = |source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        };
        let file = File::create(path).map_err(to_write_error)?;
        let mut out = BufWriter::new(file);
        writer::DxfWriter::new(&mut out)
            .write_drawing(drawing)
            .map_err(to_write_error)?;
        out.flush().map_err(to_write_error)
    }
}

#[derive(Debug)]
enum DxfError {
    Unsupported { feature: String },
    Invalid { message: String },
}

impl DxfError {
    fn unsupported(feature: impl Into<String>) -> Self {
        Self::Unsupported {
            feature: feature.into(),
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }
}

impl From<DxfError> for IoError {
    fn from(err: DxfError) -> Self {
        match err {
            DxfError::Unsupported { feature } => IoError::UnsupportedFeature(feature),
            DxfError::Invalid { message } => IoError::InvalidDocument(message),
        }
    }
}
