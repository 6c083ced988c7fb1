use eldercare_core::{Error, Result};
use eldercare_storage::Datastore;

/// Who to reach about a patient.
#[derive(Debug, Clone, PartialEq)]
pub struct Contact {
    pub patient_name: String,
    pub phone: Option<String>,
}

/// Guardian account phone first, then the phone stored on the patient
/// record.
pub fn resolve_contact(store: &dyn Datastore, patient_id: &str) -> Result<Contact> {
    let patient = store
        .user(patient_id)?
        .ok_or_else(|| Error::NotFound(format!("Patient not found: {}", patient_id)))?;

    let guardian_phone = match patient.guardian_id.as_deref() {
        Some(gid) => store.user(gid)?.and_then(|g| g.phone).filter(|p| !p.trim().is_empty()),
        None => None,
    };

    let phone = guardian_phone.or_else(|| patient.guardian_phone.clone().filter(|p| !p.trim().is_empty()));

    Ok(Contact {
        patient_name: patient.full_name,
        phone,
    })
}
