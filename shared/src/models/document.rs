//! Identity and professional documents, role verification

use serde::{Deserialize, Serialize};

use super::user::UserRole;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DocumentType {
    IdCard,
    DrivingLicense,
    VehicleRegistration,
    Insurance,
    QualificationCertificate,
    BusinessRegistration,
    ProofOfAddress,
    Other,
}

db_enum!(DocumentType {
    IdCard => "ID_CARD",
    DrivingLicense => "DRIVING_LICENSE",
    VehicleRegistration => "VEHICLE_REGISTRATION",
    Insurance => "INSURANCE",
    QualificationCertificate => "QUALIFICATION_CERTIFICATE",
    BusinessRegistration => "BUSINESS_REGISTRATION",
    ProofOfAddress => "PROOF_OF_ADDRESS",
    Other => "OTHER",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
}

db_enum!(VerificationStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
    Expired => "EXPIRED",
});

/// Documents a role must have approved before it can operate
pub fn required_documents(role: UserRole) -> &'static [DocumentType] {
    use DocumentType::*;
    match role {
        UserRole::Deliverer => &[IdCard, DrivingLicense, VehicleRegistration, Insurance],
        UserRole::Provider => &[IdCard, QualificationCertificate, Insurance, ProofOfAddress],
        UserRole::Merchant => &[IdCard, BusinessRegistration, ProofOfAddress],
        UserRole::Client | UserRole::Admin => &[],
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct Document {
    pub id: i64,
    pub user_id: i64,
    pub doc_type: String,
    pub file_url: String,
    pub file_name: String,
    pub status: String,
    pub expires_at: Option<i64>,
    pub rejection_reason: Option<String>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<i64>,
    pub created_at: i64,
}

impl Document {
    pub fn doc_type(&self) -> Option<DocumentType> {
        DocumentType::from_db(&self.doc_type)
    }

    pub fn status(&self) -> Option<VerificationStatus> {
        VerificationStatus::from_db(&self.status)
    }

    /// Stored status, with approvals past their expiry reported as expired
    pub fn effective_status(&self, now: i64) -> Option<VerificationStatus> {
        let status = self.status()?;
        if status == VerificationStatus::Approved && self.expires_at.is_some_and(|exp| exp <= now) {
            return Some(VerificationStatus::Expired);
        }
        Some(status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationSummary {
    pub required: Vec<DocumentType>,
    pub approved: Vec<DocumentType>,
    pub missing: Vec<DocumentType>,
    pub verified: bool,
}

/// Compare a user's documents with what their role requires
pub fn verification_summary(role: UserRole, documents: &[Document], now: i64) -> VerificationSummary {
    let required = required_documents(role).to_vec();
    let approved: Vec<DocumentType> = required
        .iter()
        .copied()
        .filter(|ty| {
            documents.iter().any(|d| {
                d.doc_type() == Some(*ty) && d.effective_status(now) == Some(VerificationStatus::Approved)
            })
        })
        .collect();
    let missing: Vec<DocumentType> = required
        .iter()
        .copied()
        .filter(|ty| !approved.contains(ty))
        .collect();
    VerificationSummary {
        verified: missing.is_empty(),
        required,
        approved,
        missing,
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentUpload {
    pub doc_type: DocumentType,
    pub file_url: String,
    pub file_name: String,
    pub expires_at: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MyDocuments {
    pub documents: Vec<Document>,
    pub verification: VerificationSummary,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DocumentReviewRequest {
    pub status: VerificationStatus,
    pub reason: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(ty: DocumentType, status: VerificationStatus, expires_at: Option<i64>) -> Document {
        Document {
            id: 1,
            user_id: 1,
            doc_type: ty.as_db().to_string(),
            file_url: "https://files/doc.pdf".into(),
            file_name: "doc.pdf".into(),
            status: status.as_db().to_string(),
            expires_at,
            rejection_reason: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: 0,
        }
    }

    #[test]
    fn test_required_documents() {
        assert_eq!(required_documents(UserRole::Deliverer).len(), 4);
        assert_eq!(required_documents(UserRole::Merchant).len(), 3);
        assert!(required_documents(UserRole::Client).is_empty());
        assert!(required_documents(UserRole::Provider).contains(&DocumentType::QualificationCertificate));
    }

    #[test]
    fn test_effective_status_expiry() {
        let d = doc(DocumentType::IdCard, VerificationStatus::Approved, Some(1_000));
        assert_eq!(d.effective_status(999), Some(VerificationStatus::Approved));
        assert_eq!(d.effective_status(1_000), Some(VerificationStatus::Expired));

        let rejected = doc(DocumentType::IdCard, VerificationStatus::Rejected, Some(1_000));
        assert_eq!(rejected.effective_status(5_000), Some(VerificationStatus::Rejected));
    }

    #[test]
    fn test_verification_summary() {
        let docs = vec![
            doc(DocumentType::IdCard, VerificationStatus::Approved, None),
            doc(DocumentType::BusinessRegistration, VerificationStatus::Approved, None),
            doc(DocumentType::ProofOfAddress, VerificationStatus::Pending, None),
        ];
        let summary = verification_summary(UserRole::Merchant, &docs, 0);
        assert!(!summary.verified);
        assert_eq!(summary.missing, vec![DocumentType::ProofOfAddress]);

        let mut docs = docs;
        docs.push(doc(DocumentType::ProofOfAddress, VerificationStatus::Approved, Some(10)));
        assert!(verification_summary(UserRole::Merchant, &docs, 5).verified);
        // the approval lapsed
        assert!(!verification_summary(UserRole::Merchant, &docs, 10).verified);
    }

    #[test]
    fn test_client_always_verified() {
        assert!(verification_summary(UserRole::Client, &[], 0).verified);
    }
}
