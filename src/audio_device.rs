use crate::error::{LooperError, Result};
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::{Device, Host};

/// The host named `host_name`, or the platform default.
pub fn get_host(host_name: Option<&str>) -> Result<Host> {
    let Some(name) = host_name else {
        return Ok(cpal::default_host());
    };
    let host_id = cpal::available_hosts()
        .into_iter()
        .find(|id| id.name().eq_ignore_ascii_case(name))
        .ok_or_else(|| LooperError::Device(format!("Audio host not found: {}", name)))?;
    cpal::host_from_id(host_id).map_err(|e| LooperError::device("Failed to get audio host", e))
}

pub fn get_input_devices(host: &Host) -> Result<Vec<(String, Device)>> {
    let devices = host
        .input_devices()
        .map_err(|e| LooperError::device("Failed to list input devices", e))?;
    Ok(devices
        .filter_map(|d| d.name().ok().map(|name| (name, d)))
        .collect())
}

pub fn get_output_devices(host: &Host) -> Result<Vec<(String, Device)>> {
    let devices = host
        .output_devices()
        .map_err(|e| LooperError::device("Failed to list output devices", e))?;
    Ok(devices
        .filter_map(|d| d.name().ok().map(|name| (name, d)))
        .collect())
}

pub fn find_input_device(host: &Host, name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => get_input_devices(host)?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
            .ok_or_else(|| LooperError::Device(format!("Input device not found: {}", name))),
        None => host
            .default_input_device()
            .ok_or_else(|| LooperError::Device("No default input device".to_string())),
    }
}

pub fn find_output_device(host: &Host, name: Option<&str>) -> Result<Device> {
    match name {
        Some(name) => get_output_devices(host)?
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| d)
            .ok_or_else(|| LooperError::Device(format!("Output device not found: {}", name))),
        None => host
            .default_output_device()
            .ok_or_else(|| LooperError::Device("No default output device".to_string())),
    }
}
