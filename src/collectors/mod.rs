pub mod devices;

pub use devices::find_usb_devices;
