//! RS485 line-driver configuration.
//!
//! Primary path is the TIOCSRS485 ioctl. When the driver does not support
//! it, fall back to the external setserial utility with equivalent
//! arguments. The fallback fires only on unsupported-operation errnos, so
//! a genuine permission or validation error is not masked as a missing
//! feature.

use converge_common::exec::CommandRunner;
use converge_common::spec::{Rs485Spec, SerialPortSpec};
use converge_common::ConvergeError;
use nix::errno::Errno;
use std::fs::OpenOptions;
use std::os::fd::AsRawFd;
use tracing::debug;

pub const SER_RS485_ENABLED: u32 = 1 << 0;
pub const SER_RS485_RTS_ON_SEND: u32 = 1 << 1;
pub const SER_RS485_RTS_AFTER_SEND: u32 = 1 << 2;
pub const SER_RS485_RX_DURING_TX: u32 = 1 << 4;

const TIOCSRS485: libc::c_ulong = 0x542F;

/// Kernel `struct serial_rs485`.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialRs485 {
    pub flags: u32,
    pub delay_rts_before_send: u32,
    pub delay_rts_after_send: u32,
    /// Reserved by the kernel ABI.
    pub padding: [u32; 5],
}

nix::ioctl_write_ptr_bad!(tiocsrs485, TIOCSRS485, SerialRs485);

/// Translate the spec into the kernel flags bitfield.
pub fn driver_config(spec: &Rs485Spec) -> SerialRs485 {
    let mut config = SerialRs485 {
        delay_rts_before_send: spec.delay_rts_before_send_us,
        delay_rts_after_send: spec.delay_rts_after_send_us,
        ..SerialRs485::default()
    };
    if spec.enabled {
        config.flags |= SER_RS485_ENABLED;
    }
    if spec.rts_on_send {
        config.flags |= SER_RS485_RTS_ON_SEND;
    }
    if spec.rts_after_send {
        config.flags |= SER_RS485_RTS_AFTER_SEND;
    }
    if spec.rx_during_tx {
        config.flags |= SER_RS485_RX_DURING_TX;
    }
    config
}

pub async fn configure(runner: &CommandRunner, port: &SerialPortSpec) -> Result<(), ConvergeError> {
    let spec = port.rs485.clone().unwrap_or_else(Rs485Spec::driver_default);
    let config = driver_config(&spec);

    let device = OpenOptions::new()
        .read(true)
        .write(true)
        .open(&port.device)
        .map_err(|e| ConvergeError::Io(e).context(format!("open {}", port.device)))?;

    match unsafe { tiocsrs485(device.as_raw_fd(), &config) } {
        Ok(_) => Ok(()),
        Err(Errno::ENOTTY | Errno::EINVAL | Errno::ENOSYS) => {
            debug!(
                "driver rejects TIOCSRS485 on {}, falling back to setserial",
                port.device
            );
            configure_with_setserial(runner, port, &spec).await
        }
        Err(errno) => Err(ConvergeError::Io(std::io::Error::from_raw_os_error(errno as i32))
            .context(format!("TIOCSRS485 on {}", port.device))),
    }
}

async fn configure_with_setserial(
    runner: &CommandRunner,
    port: &SerialPortSpec,
    spec: &Rs485Spec,
) -> Result<(), ConvergeError> {
    let mut args = vec![port.device.clone(), "uart".to_string(), "16550A".to_string()];
    if spec.delay_rts_before_send_us > 0 {
        args.push("rts_delay".to_string());
        args.push(spec.delay_rts_before_send_us.to_string());
    }
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    runner.run_checked("setserial", &args).await?;
    Ok(())
}
