//! Conflict-resolution policies (§4.5), expressed as [`DecideFn`] values so
//! the decision runs inside the same transaction that counts the reviews.

use slb_config::ConflictResolution;
use slb_store::{model::RequestStatus, DecideFn};

fn any_rejection_blocks(approvals: u32, rejections: u32, min_approvals: u32) -> Option<RequestStatus> {
    if rejections > 0 {
        Some(RequestStatus::Rejected)
    } else if approvals >= min_approvals {
        Some(RequestStatus::Approved)
    } else {
        None
    }
}

/// The first review decides outcome outright; later reviews are recorded
/// but never change the status again. Detected by `approvals + rejections
/// == 1`: at that point exactly one of the two counts is 1, and whichever
/// one it is names the first decision.
fn first_wins(approvals: u32, rejections: u32, _min_approvals: u32) -> Option<RequestStatus> {
    if approvals + rejections != 1 {
        return None;
    }
    if approvals == 1 { Some(RequestStatus::Approved) } else { Some(RequestStatus::Rejected) }
}

fn human_breaks_tie(approvals: u32, rejections: u32, min_approvals: u32) -> Option<RequestStatus> {
    if approvals > 0 && rejections > 0 {
        Some(RequestStatus::Escalated)
    } else if approvals >= min_approvals {
        Some(RequestStatus::Approved)
    } else if rejections > 0 {
        Some(RequestStatus::Rejected)
    } else {
        None
    }
}

/// Resolve the `DecideFn` for a configured policy.
#[must_use]
pub fn decide_fn(policy: ConflictResolution) -> DecideFn {
    match policy {
        ConflictResolution::AnyRejectionBlocks => any_rejection_blocks,
        ConflictResolution::FirstWins => first_wins,
        ConflictResolution::HumanBreaksTie => human_breaks_tie,
    }
}
