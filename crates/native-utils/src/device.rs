use anyhow::{Context, anyhow};
use cpal::Device;
use cpal::traits::{DeviceTrait, HostTrait};

fn get_host() -> cpal::Host {
    cpal::default_host()
}

/// Finds the output device called `device_name`, or the host's default output.
pub fn get_or_default_output(device_name: Option<String>) -> anyhow::Result<Device> {
    let host = get_host();
    tracing::debug!("Host: {:?}", host.id());

    let target = match device_name {
        Some(name) => name,
        None => host
            .default_output_device()
            .context("No default output device")?
            .name()
            .context("Default output device has no name")?,
    };

    host.output_devices()
        .context("Failed to list output devices")?
        .find(|device| device.name().is_ok_and(|name| name == target))
        .ok_or_else(|| anyhow!("No output device named {:?}", target))
}

/// Whether a default input device with a usable configuration exists.
pub fn input_available() -> bool {
    let host = get_host();
    match host.default_input_device() {
        Some(device) => match device.default_input_config() {
            Ok(config) => {
                tracing::debug!("Default input config: {:?}", config);
                true
            }
            Err(e) => {
                tracing::warn!("Default input device is unusable: {}", e);
                false
            }
        },
        None => false,
    }
}

/// One line per output device: name, channels and rate, with the default marked.
pub fn get_available_outputs() -> anyhow::Result<String> {
    for host in cpal::available_hosts() {
        tracing::debug!("Available host: {:?}", host);
    }

    let host = get_host();
    let default_device = host
        .default_output_device()
        .and_then(|device| device.name().ok());

    let mut device_names: Vec<String> = Vec::new();
    for out_device in host.output_devices().context("Failed to list output devices")? {
        let Ok(d_name) = out_device.name() else {
            continue;
        };
        let mut d = match out_device.default_output_config() {
            Ok(d_cfg) => format!(
                " * {}({}ch, {}hz)",
                d_name,
                d_cfg.channels(),
                d_cfg.sample_rate().0
            ),
            Err(_) => format!(" * {} (no default config)", d_name),
        };
        if default_device.as_deref() == Some(d_name.as_str()) {
            d.push_str(" [default]");
        }
        device_names.push(d);
    }
    Ok(device_names.join("\n"))
}
