use chrono::NaiveDateTime;
use tracing::info;

use super::domain::{Suspension, SuspensionReason, User};
use super::history::{ActionHistory, ActionType};
use crate::fraud::checks::format_id_piece_number;
use crate::fraud::domain::IdentityDetails;
use crate::ids::{ActionId, Sequence, UserId};
use crate::store::{ActionHistoryRepository, IdAllocator, RepositoryError};

/// Deactivate the account and leave a trace in the action history.
///
/// The caller persists `user`.
pub fn suspend_account<H>(
    user: &mut User,
    reason: SuspensionReason,
    actor: Option<UserId>,
    comment: Option<String>,
    history: &H,
    now: NaiveDateTime,
) -> Result<(), RepositoryError>
where
    H: IdAllocator + ActionHistoryRepository + ?Sized,
{
    user.is_active = false;
    user.suspension = Some(Suspension {
        reason,
        date: now,
        actor_id: actor,
        comment: comment.clone(),
    });

    let action_id = ActionId(history.next_id(Sequence::Action)?);
    history.record_action(ActionHistory::for_user(
        action_id,
        ActionType::UserSuspended,
        user.id,
        actor,
        comment,
        now,
    ))?;

    info!(
        user_id = %user.id,
        actor = ?actor,
        reason = ?reason,
        "Account has been suspended"
    );
    Ok(())
}

/// Copy what the identity provider certified onto the account.
pub fn update_user_information_from_external_source(
    user: &mut User,
    identity: &dyn IdentityDetails,
    id_piece_number: Option<&str>,
) {
    if let Some(first_name) = identity.first_name() {
        user.first_name = Some(first_name.to_string());
    }
    if let Some(last_name) = identity.last_name() {
        user.last_name = Some(last_name.to_string());
    }
    if let Some(married_name) = identity.married_name() {
        user.married_name = Some(married_name.to_string());
    }
    if let Some(civility) = identity.civility() {
        user.civility = Some(civility);
    }
    if let Some(birth_date) = identity.birth_date() {
        user.validated_birth_date = Some(birth_date);
    }
    if let Some(number) = id_piece_number.filter(|number| !number.trim().is_empty()) {
        user.id_piece_number = Some(format_id_piece_number(number));
    }
    if let Some(ine_hash) = identity.ine_hash() {
        user.ine_hash = Some(ine_hash.to_string());
    }
    if let Some(postal_code) = identity.postal_code() {
        user.postal_code = Some(postal_code.to_string());
    }
    if let Some(city) = identity.city() {
        user.city = Some(city.to_string());
    }
}
