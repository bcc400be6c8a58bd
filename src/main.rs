// 该文件是 Shanan （山南西风） 项目的一部分。
// src/main.rs - 单张图像检测入口
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shanan::task::{Outcome, launch};

fn main() -> Result<()> {
  tracing_subscriber::registry()
    .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with(tracing_subscriber::fmt::layer())
    .init();

  match launch(std::env::args_os())? {
    Outcome::Completed(summary) => {
      debug!("检测完成: {} 个物体, 耗时 {:.2?}", summary.nums, summary.elapsed)
    }
    Outcome::EarlyExit => {}
  }

  Ok(())
}
