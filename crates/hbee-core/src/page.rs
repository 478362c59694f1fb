// ── Page context ──
//
// A "page" is whatever view the application is showing: one device,
// many devices, or something unrelated to devices. It decides which
// topics to subscribe to and which devices get startup requests.

use indexmap::IndexSet;

use hbee_api::topic::device_filter;

use crate::config::AccessPolicy;

/// One device and the account that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceRef {
    pub owner_id: String,
    pub device_id: String,
}

impl DeviceRef {
    pub fn new(owner_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            owner_id: owner_id.into(),
            device_id: device_id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageContext {
    /// An overview listing several devices.
    MultiDevice { devices: Vec<DeviceRef> },
    /// A detail view of a single device.
    SingleDevice { device: DeviceRef },
    /// Nothing device-related.
    Other,
}

/// A page and the key the sync guard tracks it by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub key: String,
    pub context: PageContext,
}

impl PageInfo {
    pub fn new(key: impl Into<String>, context: PageContext) -> Self {
        Self {
            key: key.into(),
            context,
        }
    }

    /// Devices that should receive startup requests.
    pub fn devices(&self) -> &[DeviceRef] {
        match &self.context {
            PageContext::MultiDevice { devices } => devices,
            PageContext::SingleDevice { device } => std::slice::from_ref(device),
            PageContext::Other => &[],
        }
    }
}

/// Supplies the current page on demand.
pub trait PageClassifier: Send + Sync {
    fn current_page(&self) -> PageInfo;
}

/// Fixed page, for hosts where the view never changes.
impl PageClassifier for PageInfo {
    fn current_page(&self) -> PageInfo {
        self.clone()
    }
}

/// Subscription filters a page needs: `HBEE/{owner}/+/+/DEV` per owner.
///
/// Multi-device pages cover the user plus every permitted id. A
/// single-device page covers the device's owner, or the user when the
/// owner is unknown.
pub fn page_topics(page: &PageInfo, access: &AccessPolicy) -> Vec<String> {
    let mut owners: IndexSet<&str> = IndexSet::new();
    match &page.context {
        PageContext::MultiDevice { devices } => {
            owners.insert(&access.user_id);
            owners.extend(access.permitted_ids.iter().map(String::as_str));
            owners.extend(devices.iter().map(|d| d.owner_id.as_str()));
        }
        PageContext::SingleDevice { device } if !device.owner_id.is_empty() => {
            owners.insert(&device.owner_id);
        }
        PageContext::SingleDevice { .. } => {
            owners.insert(&access.user_id);
        }
        PageContext::Other => {}
    }
    owners
        .into_iter()
        .filter(|owner| !owner.is_empty())
        .map(device_filter)
        .collect()
}
