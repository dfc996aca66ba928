use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::{info, warn};

use depth_image_proc as dip;
use depth_image_proc::FrameSource;
use frame_transport::{DisparityImage, Header, MockPublisher, MockSubscriber, PointCloud2};

#[derive(Parser, Debug)]
#[command(
    name = "dip",
    version,
    about = "Depth image processing: disparity and XYZI point clouds",
    disable_help_subcommand = true
)]
struct Cli {
    /// YAML node configuration (defaults apply when omitted)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the effective configuration as YAML
    ConfigShow,
    /// Convert a raw depth frame to a disparity image
    Disparity {
        /// Raw depth frame (tightly packed, little-endian)
        #[arg(long)]
        depth: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        /// 16UC1 (millimeters) or 32FC1 (meters)
        #[arg(long, default_value = "16UC1")]
        encoding: String,
        /// Calibration YAML (width, height, k, p)
        #[arg(long)]
        calib: String,
        /// Optional output path for the raw 32FC1 disparity
        #[arg(long)]
        out: Option<String>,
    },
    /// Build an XYZI point cloud from raw depth and intensity frames and export PLY
    PointCloud {
        #[arg(long)]
        depth: String,
        #[arg(long)]
        width: u32,
        #[arg(long)]
        height: u32,
        #[arg(long, default_value = "16UC1")]
        depth_encoding: String,
        /// Raw intensity (or color) frame
        #[arg(long)]
        intensity: String,
        #[arg(long)]
        intensity_width: u32,
        #[arg(long)]
        intensity_height: u32,
        #[arg(long, default_value = "mono8")]
        intensity_encoding: String,
        /// Calibration YAML of the intensity camera
        #[arg(long)]
        calib: String,
        /// Output PLY path
        #[arg(long, default_value = "points.ply")]
        out: String,
    },
    /// Run the synthetic depth camera through both nodes and print metrics
    Demo {
        /// Depth resolution as WIDTHxHEIGHT
        #[arg(long, default_value = "320x240")]
        size: String,
        #[arg(long, default_value_t = 10u32)]
        frames: u32,
        /// Write the last point cloud to this PLY path
        #[arg(long)]
        out_ply: Option<String>,
    },
}

fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();
    let cfg = match cli.config.as_deref() {
        Some(path) => dip::load_config_file(path)?,
        None => dip::NodeConfig::default(),
    };

    match cli.command {
        Commands::ConfigShow => {
            print!("{}", cfg.to_yaml()?);
            Ok(())
        }
        Commands::Disparity {
            depth,
            width,
            height,
            encoding,
            calib,
            out,
        } => disparity(&cfg, &depth, width, height, &encoding, &calib, out.as_deref()),
        Commands::PointCloud {
            depth,
            width,
            height,
            depth_encoding,
            intensity,
            intensity_width,
            intensity_height,
            intensity_encoding,
            calib,
            out,
        } => {
            let header = Header::new(OffsetDateTime::now_utc(), "depth_optical");
            let depth =
                dip::io::read_raw_image(&depth, width, height, &depth_encoding, header.clone())?;
            let intensity = dip::io::read_raw_image(
                &intensity,
                intensity_width,
                intensity_height,
                &intensity_encoding,
                header.clone(),
            )?;
            let info = dip::io::load_calibration(&calib)?.into_camera_info(header);
            let r = dip::reconcile(&depth, &intensity, &info, &dip::ImageResampler)?;
            let cloud = dip::PointCloudConverter::new(cfg.point_cloud.invalid_depth).convert(
                &depth,
                r.companion.as_ref(),
                &r.intrinsics,
            )?;
            let written = dip::io::write_ply(&cloud, &out)?;
            info!("wrote {written} points to {out}");
            println!("ok: {written} points -> {out}");
            Ok(())
        }
        Commands::Demo {
            size,
            frames,
            out_ply,
        } => demo(&cfg, &size, frames, out_ply.as_deref()),
    }
}

fn setup_tracing() {
    // Best-effort; avoid panics if already set
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[derive(Serialize)]
struct DisparitySummary {
    width: u32,
    height: u32,
    f: f32,
    t: f32,
    min_disparity: f32,
    max_disparity: f32,
    delta_d: f32,
    valid_pixels: usize,
}

fn disparity(
    cfg: &dip::NodeConfig,
    depth_path: &str,
    width: u32,
    height: u32,
    encoding: &str,
    calib: &str,
    out: Option<&str>,
) -> Result<()> {
    let header = Header::new(OffsetDateTime::now_utc(), "depth_optical");
    let depth = dip::io::read_raw_image(depth_path, width, height, encoding, header.clone())?;
    let info = dip::io::load_calibration(calib)?.into_camera_info(header);
    let img = dip::DisparityConverter::new(cfg.disparity.params()).convert(&depth, &info)?;

    let valid_pixels = (0..height)
        .flat_map(|v| (0..width).map(move |u| (u, v)))
        .filter(|&(u, v)| dip::disparity_at(&img, u, v).is_some_and(|d| d > 0.0))
        .count();
    if let Some(path) = out {
        std::fs::write(path, &img.image.data)
            .with_context(|| format!("writing disparity: {path}"))?;
    }
    let summary = DisparitySummary {
        width: img.image.width,
        height: img.image.height,
        f: img.f,
        t: img.t,
        min_disparity: img.min_disparity,
        max_disparity: img.max_disparity,
        delta_d: img.delta_d,
        valid_pixels,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn demo(cfg: &dip::NodeConfig, size: &str, frames: u32, out_ply: Option<&str>) -> Result<()> {
    let hub = dip::MetricsHub::new().map_err(|e| anyhow::anyhow!(e))?;
    let resolver = cfg.resolver()?;

    let disparity_out: Arc<MockPublisher<DisparityImage>> = Arc::new(MockPublisher::new(
        &resolver.resolve(&cfg.disparity.topics.output)?,
    ));
    let cloud_out: Arc<MockPublisher<PointCloud2>> = Arc::new(MockPublisher::new(
        &resolver.resolve(&cfg.point_cloud.topics.output)?,
    ));
    let disparity_node = dip::DisparityNode::new(
        cfg,
        disparity_out.clone(),
        dip::DisparityInputs {
            depth: Box::new(MockSubscriber::new()),
            camera_info: Box::new(MockSubscriber::new()),
        },
        hub.node.clone(),
    )?;
    let cloud_node = dip::PointCloudXyziNode::new(
        cfg,
        cloud_out.clone(),
        dip::PointCloudInputs {
            depth: Box::new(MockSubscriber::new().with_transports(&[
                "raw",
                "compressed",
                "compressedDepth",
            ])),
            intensity: Box::new(MockSubscriber::new()),
            camera_info: Box::new(MockSubscriber::new()),
        },
        hub.node.clone(),
    )?;

    disparity_out.set_subscription_count(1);
    cloud_out.set_subscription_count(1);
    disparity_node.on_consumers_changed()?;
    cloud_node.on_consumers_changed()?;

    let mut camera = dip::MockDepthCamera::open(size)?;
    let mut last_cloud = None;
    for _ in 0..frames {
        let set = camera.read()?;
        disparity_node.handle_depth(set.depth.clone());
        disparity_node.handle_camera_info(set.depth_camera_info);
        cloud_node.handle_depth(set.depth);
        cloud_node.handle_intensity(set.intensity);
        cloud_node.handle_camera_info(set.camera_info);
        if let Some(cloud) = cloud_out.take().pop() {
            last_cloud = Some(cloud);
        }
    }
    info!(
        "demo: {} disparity images, {} clouds",
        disparity_out.take().len(),
        hub.node.clouds_published.get()
    );

    match (out_ply, last_cloud) {
        (Some(path), Some(cloud)) => {
            let written = dip::io::write_ply(&cloud, path)?;
            println!("ok: {written} points -> {path}");
        }
        (Some(_), None) => warn!("no point cloud was produced, PLY not written"),
        _ => {}
    }

    disparity_out.set_subscription_count(0);
    cloud_out.set_subscription_count(0);
    disparity_node.on_consumers_changed()?;
    cloud_node.on_consumers_changed()?;
    print!("{}", hub.encode_text());
    Ok(())
}

