//! Mapping between a PCI bus address plus device id and a filesystem safe
//! device UID.
//!
//! `0000:00:01.0` + `0x0000` <-> `0000-00-01-0-0x0000`

/// Length of a PCI address in DBDF notation, e.g. `0000:00:00.0`.
pub const PCI_ADDRESS_LENGTH: usize = "0000:00:00.0".len();

/// Length of a full UID built from a 6 character device id.
pub const UID_LENGTH: usize = "0000-00-00-0-0x0000".len();

/// Builds the device UID from a bus address and a raw device id.
pub fn device_uid(pci_address: &str, device_id: &str) -> String {
    let encoded: String = pci_address
        .chars()
        .map(|c| if c == ':' || c == '.' { '-' } else { c })
        .collect();
    format!("{encoded}-{device_id}")
}

/// Splits a device UID back into its bus address and device id.
///
/// Returns `None` when the UID is shorter than an encoded bus address or
/// lacks the separator in front of the device id.
pub fn pci_info_from_uid(uid: &str) -> Option<(String, String)> {
    let encoded = uid.get(..PCI_ADDRESS_LENGTH)?;
    let device_id = uid.get(PCI_ADDRESS_LENGTH..)?.strip_prefix('-')?;

    let pci_address = encoded.replacen('-', ":", 2).replacen('-', ".", 1);
    Some((pci_address, device_id.to_string()))
}
