use anyhow::{bail, Context, Result};
use candle_core::safetensors::MmapedSafetensors;
use candle_core::utils::{cuda_is_available, metal_is_available};
use candle_core::DType;
use candle_core::Device;
use serde_json::Value;
use std::fs::File;
use std::path::{Path, PathBuf};

#[allow(unused_imports)]
use tracing::{info, debug, error, warn};

pub fn device() -> Result<Device> {
    if cuda_is_available() {
        info!("Running on CUDA device");
        Ok(Device::new_cuda(0)?)
    } else if metal_is_available() {
        info!("Running on Metal device");
        Ok(Device::new_metal(0)?)
    } else {
        info!("Running on CPU");
        Ok(Device::Cpu)
    }
}

/// Short device identifier reported by the info and health endpoints.
pub fn device_label(device: &Device) -> String {
    match device {
        Device::Cpu => "cpu".to_string(),
        Device::Cuda(_) => "cuda:0".to_string(),
        Device::Metal(_) => "metal:0".to_string(),
    }
}

pub fn parse_dtype(dtype: &Option<String>) -> Result<DType> {
    match dtype.as_deref() {
        Some("f16") => Ok(DType::F16),
        Some("bf16") => Ok(DType::BF16),
        Some("f32") => Ok(DType::F32),
        Some(dtype) => bail!("Unsupported dtype {dtype}"),
        None => Ok(DType::F16),
    }
}

/// Weight files of a model directory: the shards listed in
/// `model.safetensors.index.json`, or the lone `model.safetensors`.
pub fn load_safetensor_model_files(model_path: &Path) -> Result<Vec<PathBuf>> {
    let index_path = model_path.join("model.safetensors.index.json");
    if !index_path.exists() {
        let single = model_path.join("model.safetensors");
        if !single.exists() {
            bail!("No model.safetensors or model.safetensors.index.json in {}", model_path.display());
        }
        return Ok(vec![single]);
    }

    let model_index_file = File::open(&index_path)?;
    let model_index_json: Value = serde_json::from_reader(&model_index_file).map_err(candle_core::Error::wrap)?;
    let model_weight_map = match model_index_json.get("weight_map") {
        None => bail!("no weight map in {}", index_path.display()),
        Some(Value::Object(map)) => map,
        Some(_) => bail!("weight map in {} is not a map", index_path.display()),
    };

    let mut safetensors_files = std::collections::BTreeSet::new();
    for value in model_weight_map.values() {
        if let Some(file) = value.as_str() {
            safetensors_files.insert(file.to_string());
        }
    }

    let safetensors_files: Vec<_> = safetensors_files
        .iter()
        .map(|v| model_path.join(v))
        .collect();

    Ok(safetensors_files)
}

/// Total number of scalar parameters stored across `files`.
pub fn count_parameters(files: &[PathBuf]) -> Result<usize> {
    // SAFETY: the weight files are treated as read-only for the process lifetime.
    let tensors = unsafe { MmapedSafetensors::multi(files)? };
    let total = tensors
        .tensors()
        .iter()
        .map(|(_, view)| view.shape().iter().product::<usize>())
        .sum();
    Ok(total)
}

/// `tokenizer.json` location: an explicit file, a directory holding it, or
/// the model directory when no tokenizer path is configured.
pub fn resolve_tokenizer_file(model_dir: &Path, tokenizer_path: Option<&str>) -> Result<PathBuf> {
    let candidate = match tokenizer_path {
        Some(path) => {
            let path = Path::new(path);
            if path.is_dir() { path.join("tokenizer.json") } else { path.to_path_buf() }
        }
        None => model_dir.join("tokenizer.json"),
    };

    if !candidate.is_file() {
        bail!("Tokenizer file not found: {}", candidate.display());
    }
    Ok(candidate)
}

pub fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(file).with_context(|| format!("Failed to parse {}", path.display()))
}
