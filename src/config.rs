use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;

use crate::history::DEFAULT_HISTORY_CAPACITY;
use crate::model::TensorLayout;

#[derive(Parser, Clone, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[arg(
        short,
        long,
        env = "MODEL_PATH",
        default_value = "models/unet_dental_segmentation.onnx"
    )]
    pub model_path: PathBuf,

    #[arg(long, env = "BIND_ADDRESS", default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub host: IpAddr,

    #[arg(short, long, env = "PORT", default_value_t = 5000)]
    pub port: u16,

    #[arg(short, long, env = "DEVICE_ID", default_value_t = 0)]
    pub device_id: i32,

    #[arg(long, env = "TENSOR_LAYOUT", value_enum, default_value_t = TensorLayout::Nhwc)]
    pub layout: TensorLayout,

    /// Input size used when the model leaves its spatial dimensions dynamic.
    #[arg(long, env = "IMAGE_SIZE", default_value_t = 128)]
    pub image_size: u32,

    #[arg(long, env = "OVERLAY_ALPHA", default_value_t = 0.6, value_parser = check_alpha)]
    pub alpha: f32,

    /// JSON class catalog; the built-in dental catalog is used when absent.
    #[arg(long, env = "CLASS_CATALOG")]
    pub catalog: Option<PathBuf>,

    #[arg(long, env = "HISTORY_CAPACITY", default_value_t = DEFAULT_HISTORY_CAPACITY)]
    pub history_capacity: usize,

    #[arg(long, env = "MAX_UPLOAD_BYTES", default_value_t = 16 * 1024 * 1024)]
    pub max_upload_bytes: usize,

    #[arg(long, env = "RUST_LOG", default_value = "dental_seg_rs=info,tower_http=info")]
    pub log_filter: String,
}

impl Config {
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}

fn check_alpha(s: &str) -> Result<f32, String> {
    let alpha: f32 = s
        .parse()
        .map_err(|e| format!("`{s}` is not a number: {e}"))?;
    crate::overlay::check_alpha(alpha).map_err(|e| e.to_string())?;
    Ok(alpha)
}
