// SPDX-License-Identifier: MIT
// Copyright (c) 2025 Matthias Bilger <matthias@bilger.info>

use crate::commands::{Command, Frame};
use crate::constants::{
    BUFFER_SIZE, DEFAULT_IO_TIMEOUT_MILLIS, DEFAULT_PRODUCT_ID, DEFAULT_VENDOR_ID, USB_ALT_SETTING,
    USB_INTERFACE,
};
use log::{debug, info, warn};
use rusb::{ConfigDescriptor, DeviceHandle, Direction, GlobalContext, TransferType};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Device identification information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,
    #[serde(default = "default_product_id")]
    pub product_id: u16,
}

fn default_vendor_id() -> u16 {
    DEFAULT_VENDOR_ID
}

fn default_product_id() -> u16 {
    DEFAULT_PRODUCT_ID
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self {
            vendor_id: DEFAULT_VENDOR_ID,
            product_id: DEFAULT_PRODUCT_ID,
        }
    }
}

/// Options applied when opening and talking to the device
#[derive(Debug, Clone)]
pub struct UsbOptions {
    /// Per-transfer timeout, `Duration::ZERO` blocks until the device answers
    pub io_timeout: Duration,
    /// Detach a kernel driver bound to the command interface, where the
    /// platform supports it
    pub detach_kernel_driver: bool,
}

impl Default for UsbOptions {
    fn default() -> Self {
        Self {
            io_timeout: Duration::from_millis(DEFAULT_IO_TIMEOUT_MILLIS),
            detach_kernel_driver: true,
        }
    }
}

/// Errors that can occur with USB operations
#[derive(Debug, thiserror::Error)]
pub enum UsbError {
    #[error("Device {vendor_id:04x}:{product_id:04x} not found")]
    DeviceNotFound { vendor_id: u16, product_id: u16 },

    #[error("Interface {interface} setting {setting} not found in active configuration")]
    InterfaceNotFound { interface: u8, setting: u8 },

    #[error("No {0:?} endpoint on the command interface")]
    EndpointNotFound(Direction),

    #[error("Endpoint {address:#04x} uses unsupported transfer type {transfer_type:?}")]
    UnsupportedEndpoint { address: u8, transfer_type: TransferType },

    #[error("Transfer timed out")]
    Timeout,

    #[error("Device disconnected")]
    Disconnected,

    #[error("Short write: sent {actual} of {expected} bytes")]
    ShortWrite { expected: usize, actual: usize },

    #[error("Short read: received {actual} of {expected} bytes")]
    ShortRead { expected: usize, actual: usize },

    #[error("Failed to write to device: {0}")]
    WriteFailed(String),

    #[error("Failed to read from device: {0}")]
    ReadFailed(String),

    #[error("USB API error: {0}")]
    UsbApiError(String),
}

/// Why a single command did not complete
#[derive(Debug, thiserror::Error)]
pub enum CommandFailure {
    #[error("Unexpected response at byte {offset}: expected {expected:#04x}, got {actual:#04x}")]
    Mismatch { offset: usize, expected: u8, actual: u8 },

    #[error(transparent)]
    Transport(#[from] UsbError),
}

/// One synchronous request/response exchange with the device
pub trait Transport {
    /// Write `request` and read back exactly one frame
    fn exchange(&mut self, request: &Frame) -> Result<Frame, UsbError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn exchange(&mut self, request: &Frame) -> Result<Frame, UsbError> {
        (**self).exchange(request)
    }
}

/// Send `command` and check the device answered with its expected response.
///
/// The whole frame has to match; I/O problems are reported separately from
/// content mismatches.
pub fn send_command<T: Transport + ?Sized>(transport: &mut T, command: &Command) -> Result<(), CommandFailure> {
    let response = transport.exchange(command.request())?;

    match command.first_mismatch(&response) {
        None => Ok(()),
        Some(offset) => Err(CommandFailure::Mismatch {
            offset,
            expected: command.expected_response()[offset],
            actual: response[offset],
        }),
    }
}

/// Resolved endpoint of the command interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub address: u8,
    pub transfer_type: TransferType,
}

/// Opened watchdog device with its command endpoints
pub struct UsbDevice {
    handle: DeviceHandle<GlobalContext>,
    info: DeviceInfo,
    endpoint_out: Endpoint,
    endpoint_in: Endpoint,
    timeout: Duration,
}

impl UsbDevice {
    /// Find the device, resolve its endpoints and claim the command interface
    pub fn open(info: &DeviceInfo, options: &UsbOptions) -> Result<Self, UsbError> {
        info!(
            "Looking for device {:04x}:{:04x}...",
            info.vendor_id, info.product_id
        );

        let devices = rusb::devices().map_err(|e| UsbError::UsbApiError(e.to_string()))?;
        let device = devices
            .iter()
            .find(|device| {
                device
                    .device_descriptor()
                    .map(|d| d.vendor_id() == info.vendor_id && d.product_id() == info.product_id)
                    .unwrap_or(false)
            })
            .ok_or(UsbError::DeviceNotFound {
                vendor_id: info.vendor_id,
                product_id: info.product_id,
            })?;

        debug!(
            "Found device on bus {} address {}",
            device.bus_number(),
            device.address()
        );

        let config = device
            .active_config_descriptor()
            .map_err(|e| UsbError::UsbApiError(e.to_string()))?;
        let (endpoint_out, endpoint_in) = resolve_endpoints(&config)?;

        let mut handle = device.open().map_err(|e| UsbError::UsbApiError(e.to_string()))?;

        if options.detach_kernel_driver && rusb::supports_detach_kernel_driver() {
            match handle.kernel_driver_active(USB_INTERFACE) {
                Ok(true) => {
                    info!("Detaching kernel driver from interface {}", USB_INTERFACE);
                    handle
                        .detach_kernel_driver(USB_INTERFACE)
                        .map_err(|e| UsbError::UsbApiError(e.to_string()))?;
                }
                Ok(false) => {}
                Err(e) => warn!("Could not query kernel driver state: {}", e),
            }
        }

        handle
            .claim_interface(USB_INTERFACE)
            .map_err(|e| UsbError::UsbApiError(e.to_string()))?;

        info!(
            "Connected to device {:04x}:{:04x} (OUT {:#04x}, IN {:#04x})",
            info.vendor_id, info.product_id, endpoint_out.address, endpoint_in.address
        );

        Ok(Self {
            handle,
            info: *info,
            endpoint_out,
            endpoint_in,
            timeout: options.io_timeout,
        })
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// Command endpoints as (OUT, IN)
    pub fn endpoints(&self) -> (Endpoint, Endpoint) {
        (self.endpoint_out, self.endpoint_in)
    }

    fn write_frame(&self, frame: &Frame) -> Result<(), UsbError> {
        let address = self.endpoint_out.address;
        let written = match self.endpoint_out.transfer_type {
            TransferType::Interrupt => self.handle.write_interrupt(address, frame, self.timeout),
            _ => self.handle.write_bulk(address, frame, self.timeout),
        }
        .map_err(|e| map_transfer_error(e, UsbError::WriteFailed))?;

        check_len(written, Direction::Out)
    }

    fn read_frame(&self) -> Result<Frame, UsbError> {
        let address = self.endpoint_in.address;
        let mut buffer = [0u8; BUFFER_SIZE];
        let read = match self.endpoint_in.transfer_type {
            TransferType::Interrupt => self.handle.read_interrupt(address, &mut buffer, self.timeout),
            _ => self.handle.read_bulk(address, &mut buffer, self.timeout),
        }
        .map_err(|e| map_transfer_error(e, UsbError::ReadFailed))?;

        check_len(read, Direction::In)?;
        Ok(buffer)
    }
}

impl Transport for UsbDevice {
    fn exchange(&mut self, request: &Frame) -> Result<Frame, UsbError> {
        debug!("USB TX: {:02x?}", &request[..]);
        self.write_frame(request)?;

        let response = self.read_frame()?;
        debug!("USB RX: {:02x?}", &response[..]);
        Ok(response)
    }
}

impl Drop for UsbDevice {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(USB_INTERFACE) {
            debug!("Failed to release interface {}: {}", USB_INTERFACE, e);
        }
    }
}

fn resolve_endpoints(config: &ConfigDescriptor) -> Result<(Endpoint, Endpoint), UsbError> {
    for interface in config.interfaces() {
        if interface.number() != USB_INTERFACE {
            continue;
        }

        for setting in interface.descriptors() {
            if setting.setting_number() != USB_ALT_SETTING {
                continue;
            }

            let mut endpoint_out = None;
            let mut endpoint_in = None;
            for descriptor in setting.endpoint_descriptors() {
                let endpoint = Endpoint {
                    address: descriptor.address(),
                    transfer_type: descriptor.transfer_type(),
                };
                match descriptor.direction() {
                    Direction::Out if endpoint_out.is_none() => endpoint_out = Some(endpoint),
                    Direction::In if endpoint_in.is_none() => endpoint_in = Some(endpoint),
                    _ => {}
                }
            }

            let endpoint_out = endpoint_out.ok_or(UsbError::EndpointNotFound(Direction::Out))?;
            let endpoint_in = endpoint_in.ok_or(UsbError::EndpointNotFound(Direction::In))?;
            check_transfer_type(&endpoint_out)?;
            check_transfer_type(&endpoint_in)?;
            return Ok((endpoint_out, endpoint_in));
        }
    }

    Err(UsbError::InterfaceNotFound {
        interface: USB_INTERFACE,
        setting: USB_ALT_SETTING,
    })
}

fn check_transfer_type(endpoint: &Endpoint) -> Result<(), UsbError> {
    match endpoint.transfer_type {
        TransferType::Bulk | TransferType::Interrupt => Ok(()),
        transfer_type => Err(UsbError::UnsupportedEndpoint {
            address: endpoint.address,
            transfer_type,
        }),
    }
}

fn map_transfer_error(error: rusb::Error, other: fn(String) -> UsbError) -> UsbError {
    match error {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::NoDevice => UsbError::Disconnected,
        e => other(e.to_string()),
    }
}

/// Every transfer moves exactly one frame
fn check_len(actual: usize, direction: Direction) -> Result<(), UsbError> {
    if actual == BUFFER_SIZE {
        return Ok(());
    }
    let expected = BUFFER_SIZE;
    Err(match direction {
        Direction::Out => UsbError::ShortWrite { expected, actual },
        Direction::In => UsbError::ShortRead { expected, actual },
    })
}
