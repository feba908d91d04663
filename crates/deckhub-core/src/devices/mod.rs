pub mod elgato;
pub mod prontokey;
pub mod virtual_device;

/// Attempt to initialise all connected devices.
pub async fn initialise_devices() {
    // Wired or Bluetooth serial key decks identify with a known USB bridge.
    for port in serialport::available_ports().unwrap_or_default() {
        if let serialport::SerialPortType::UsbPort(info) = port.port_type
            && info.vid == 0x10c4
            && info.pid == 0xea60
        {
            tokio::spawn(prontokey::init(port.port_name));
        }
    }

    tokio::spawn(virtual_device::init());

    elgato::initialise_devices().await;
}
