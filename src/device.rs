// 该文件是 Shanan （山南西风） 项目的一部分。
// src/device.rs - 推理运行环境初始化
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

//! ONNX Runtime 进程级环境。
//!
//! 必须在构建任何模型之前调用 [`init_environment`]：执行提供者与显存分配策略
//! 在会话创建后无法再更改。

use std::sync::OnceLock;

use ort::execution_providers::{
  ArenaExtendStrategy, CPUExecutionProvider, CUDAExecutionProvider, ExecutionProvider,
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// 不启用显卡加速的平台（`std::env::consts::OS` 的取值）
pub const EXCLUDED_PLATFORM: &str = "macos";

/// 第一块显卡的设备编号
const FIRST_GPU: i32 = 0;

#[derive(Error, Debug)]
pub enum DeviceError {
  #[error("ONNX Runtime 环境初始化失败: {0}")]
  InitError(String),
}

/// 推理使用的计算设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accelerator {
  Cpu,
  /// 按需增长显存的 CUDA 设备
  Cuda { device_id: i32 },
}

/// 已提交的进程级环境
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Environment {
  pub accelerator: Accelerator,
}

static ENVIRONMENT: OnceLock<Environment> = OnceLock::new();

/// 根据平台与显卡探测结果决定计算设备
pub fn plan_accelerator(platform: &str, gpu_available: bool) -> Accelerator {
  if platform == EXCLUDED_PLATFORM || !gpu_available {
    Accelerator::Cpu
  } else {
    Accelerator::Cuda {
      device_id: FIRST_GPU,
    }
  }
}

fn probe_gpu(platform: &str) -> bool {
  if platform == EXCLUDED_PLATFORM {
    return false;
  }
  match CUDAExecutionProvider::default().is_available() {
    Ok(available) => available,
    Err(e) => {
      warn!("查询 CUDA 可用性失败: {}", e);
      false
    }
  }
}

fn commit(accelerator: Accelerator) -> Result<(), DeviceError> {
  let builder = ort::init().with_name("shanan");
  let builder = match accelerator {
    Accelerator::Cuda { device_id } => {
      info!("在 CUDA 设备 {} 上启用显存按需增长", device_id);
      builder.with_execution_providers([CUDAExecutionProvider::default()
        .with_device_id(device_id)
        .with_arena_extend_strategy(ArenaExtendStrategy::SameAsRequested)
        .build()])
    }
    Accelerator::Cpu => {
      info!("未启用显卡加速, 使用 CPU 推理");
      builder.with_execution_providers([CPUExecutionProvider::default().build()])
    }
  };
  builder
    .commit()
    .map_err(|e| DeviceError::InitError(e.to_string()))?;
  Ok(())
}

/// 初始化进程级推理环境，重复调用返回首次的结果
pub fn init_environment(platform: &str) -> Result<Environment, DeviceError> {
  if let Some(env) = ENVIRONMENT.get() {
    debug!("推理环境已初始化: {:?}", env);
    return Ok(*env);
  }

  let accelerator = plan_accelerator(platform, probe_gpu(platform));
  commit(accelerator)?;

  Ok(*ENVIRONMENT.get_or_init(|| Environment { accelerator }))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn excluded_platform_never_uses_gpu() {
    assert_eq!(plan_accelerator("macos", true), Accelerator::Cpu);
    assert_eq!(plan_accelerator("macos", false), Accelerator::Cpu);
  }

  #[test]
  fn first_gpu_is_selected_when_available() {
    assert_eq!(
      plan_accelerator("linux", true),
      Accelerator::Cuda { device_id: 0 }
    );
    assert_eq!(
      plan_accelerator("windows", true),
      Accelerator::Cuda { device_id: 0 }
    );
  }

  #[test]
  fn no_gpu_falls_back_to_cpu() {
    assert_eq!(plan_accelerator("linux", false), Accelerator::Cpu);
  }

  #[test]
  fn excluded_platform_skips_probe() {
    assert!(!probe_gpu(EXCLUDED_PLATFORM));
  }
}
