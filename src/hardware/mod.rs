// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! Hardware MIDI devices.
//!
//! Each discovered port becomes one [`HardwareDevice`] carrying its channel,
//! control-change cache and encoder mapping. The [`HardwareDeviceManager`]
//! owns every port handle and handles discovery and lifecycle.

pub mod device;
pub mod manager;

pub use device::{DeviceDefinition, DeviceDirection, HardwareDevice};
pub use manager::HardwareDeviceManager;
