use serde::Serialize;

/// Whether this node owns a key, and whether that answer may change because
/// the key is being transferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DataLocality {
    Local,
    LocalUncertain,
    NotLocal,
    NotLocalUncertain,
}

impl DataLocality {
    pub fn from_flags(local: bool, transfer_in_progress: bool) -> Self {
        match (local, transfer_in_progress) {
            (true, false) => DataLocality::Local,
            (true, true) => DataLocality::LocalUncertain,
            (false, false) => DataLocality::NotLocal,
            (false, true) => DataLocality::NotLocalUncertain,
        }
    }

    pub fn is_local(self) -> bool {
        matches!(self, DataLocality::Local | DataLocality::LocalUncertain)
    }

    pub fn is_uncertain(self) -> bool {
        matches!(
            self,
            DataLocality::LocalUncertain | DataLocality::NotLocalUncertain
        )
    }
}
