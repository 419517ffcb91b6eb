use anyhow::Context;
use cpal::traits::{DeviceTrait, HostTrait};
use cpal::Device;

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Returns the named input device, or the host default when `device_name` is `None`.
pub fn get_or_default_input(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());
    match device_name {
        None => host
            .default_input_device()
            .context("No default input device"),
        Some(target) => host
            .input_devices()
            .context("Failed to enumerate input devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No input device named {:?}", target)),
    }
}

/// Returns the named output device, or the host default when `device_name` is `None`.
pub fn get_or_default_output(device_name: Option<&str>) -> anyhow::Result<Device> {
    let host = get_host();
    match device_name {
        None => host
            .default_output_device()
            .context("No default output device"),
        Some(target) => host
            .output_devices()
            .context("Failed to enumerate output devices")?
            .find(|d| d.name().is_ok_and(|name| name == target))
            .with_context(|| format!("No output device named {:?}", target)),
    }
}

fn describe(name: &str, channels: u16, sample_rate: u32, is_default: bool) -> String {
    let mut d = format!(" * {}({}ch, {}hz)", name, channels, sample_rate);
    if is_default {
        d.push_str(" [default]");
    }
    d
}

pub fn get_available_inputs() -> anyhow::Result<String> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_device = host.default_input_device().and_then(|d| d.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for in_device in host.input_devices().context("No input devices found")? {
        let Ok(d_name) = in_device.name() else {
            continue;
        };
        match in_device.default_input_config() {
            Ok(d_cfg) => device_names.push(describe(
                &d_name,
                d_cfg.channels(),
                d_cfg.sample_rate().0,
                default_device.as_deref() == Some(d_name.as_str()),
            )),
            Err(e) => tracing::debug!("Skipping input {:?}: {}", d_name, e),
        }
    }
    Ok(device_names.join("\n"))
}

pub fn get_available_outputs() -> anyhow::Result<String> {
    let host = get_host();
    let default_device = host.default_output_device().and_then(|d| d.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for out_device in host.output_devices().context("No output devices found")? {
        let Ok(d_name) = out_device.name() else {
            continue;
        };
        match out_device.default_output_config() {
            Ok(d_cfg) => device_names.push(describe(
                &d_name,
                d_cfg.channels(),
                d_cfg.sample_rate().0,
                default_device.as_deref() == Some(d_name.as_str()),
            )),
            Err(e) => tracing::debug!("Skipping output {:?}: {}", d_name, e),
        }
    }
    Ok(device_names.join("\n"))
}
