//! Change detection between a local file and the remote object under the
//! same key.

use crate::local::LocalFile;
use crate::{RemoteObject, UploadReason};

/// Whether `remote` must be replaced by `local`, and why.
///
/// Sizes are compared first; the local fingerprint is only computed when
/// they match. Returns `None` when both size and fingerprint are equal.
#[must_use]
pub fn should_replace(local: &LocalFile, remote: &RemoteObject) -> Option<UploadReason> {
    if local.size() != remote.size {
        return Some(UploadReason::Size);
    }

    if local.fingerprint() != remote.fingerprint {
        return Some(UploadReason::Fingerprint);
    }

    None
}

/// Classifies a local file against the inventory entry for its key.
///
/// A missing remote object always uploads ([`UploadReason::NotFound`]);
/// `force` uploads without comparing anything ([`UploadReason::Force`]).
#[must_use]
pub fn classify(
    local: &LocalFile,
    remote: Option<&RemoteObject>,
    force: bool,
) -> Option<UploadReason> {
    let Some(remote) = remote else {
        return Some(UploadReason::NotFound);
    };

    if force {
        return Some(UploadReason::Force);
    }

    should_replace(local, remote)
}
