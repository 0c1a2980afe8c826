//! Certificate and project ledger.
//!
//! A derived index over committed transactions: certificates with their
//! total/assigned/compensated accumulators and the projects they reference.
//! Updated in lockstep with block application through [`LedgerDelta`]s so
//! that disconnects restore the prior state exactly.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::consensus::error::{ConsensusError, Result};
use crate::consensus::types::Transaction;

/// On-chain record of a measured CO2 reduction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub certificate_id: String,
    pub project_id: String,
    /// Capacity fixed at issuance, in satoshi (kg CO2).
    pub total_amount: u64,
    /// Satoshi bound to this certificate so far.
    pub assigned_amount: u64,
    /// Satoshi retired against this certificate so far.
    pub compensated_amount: u64,
    pub issuer_address: String,
    pub standard: String,
    pub location: String,
    pub issue_date: String,
    pub metadata: BTreeMap<String, String>,
}

impl Certificate {
    /// Headroom still available for compensation.
    pub fn remaining(&self) -> u64 {
        self.assigned_amount.saturating_sub(self.compensated_amount)
    }
}

/// The real-world source of certificates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub project_id: String,
    pub name: String,
    pub project_type: String,
    pub location: String,
    pub created_height: u32,
}

/// The certificate blob carried in AssignCert transaction metadata,
/// canonical JSON on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateIssuance {
    pub certificate_id: String,
    pub project_id: String,
    pub project_name: String,
    pub project_type: String,
    pub total_amount: u64,
    pub standard: String,
    pub location: String,
    pub issue_date: String,
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

impl CertificateIssuance {
    /// Parse the issuance blob out of an AssignCert transaction.
    pub fn from_tx(tx: &Transaction) -> Result<Self> {
        serde_json::from_slice(&tx.metadata)
            .map_err(|e| ConsensusError::CertMetadataInvalid(e.to_string()))
    }
}

/// Check a certificate id against the `CERT-\d{4}-\d{4,}` form.
pub fn check_certificate_id(id: &str) -> Result<()> {
    let malformed = || ConsensusError::CertIdMalformed(id.to_string());
    let rest = id.strip_prefix("CERT-").ok_or_else(malformed)?;
    let (year, serial) = rest.split_once('-').ok_or_else(malformed)?;
    if year.len() != 4 || !year.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    if serial.len() < 4 || !serial.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    Ok(())
}

/// Block-sized batch of ledger changes, reversible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDelta {
    pub new_certificates: Vec<Certificate>,
    pub new_projects: Vec<Project>,
    /// `(certificate_id, amount)` increments to `assigned_amount`.
    pub assignments: Vec<(String, u64)>,
    /// `(certificate_id, amount)` increments to `compensated_amount`.
    pub compensations: Vec<(String, u64)>,
}

impl LedgerDelta {
    pub fn is_empty(&self) -> bool {
        self.new_certificates.is_empty()
            && self.new_projects.is_empty()
            && self.assignments.is_empty()
            && self.compensations.is_empty()
    }
}

/// In-memory certificate/project index.
#[derive(Debug, Default, Clone)]
pub struct CertificateLedger {
    certificates: HashMap<String, Certificate>,
    projects: HashMap<String, Project>,
}

impl CertificateLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn certificate(&self, id: &str) -> Option<&Certificate> {
        self.certificates.get(id)
    }

    pub fn project(&self, id: &str) -> Option<&Project> {
        self.projects.get(id)
    }

    pub fn contains_certificate(&self, id: &str) -> bool {
        self.certificates.contains_key(id)
    }

    pub fn certificate_count(&self) -> usize {
        self.certificates.len()
    }

    pub fn project_count(&self) -> usize {
        self.projects.len()
    }

    pub fn certificates(&self) -> impl Iterator<Item = &Certificate> {
        self.certificates.values()
    }

    pub fn projects(&self) -> impl Iterator<Item = &Project> {
        self.projects.values()
    }

    /// Apply a delta. The chain writer validates invariants beforehand; a
    /// violation observed here means the stores disagree and is fatal.
    pub fn apply(&mut self, delta: &LedgerDelta) -> Result<()> {
        for cert in &delta.new_certificates {
            if self.certificates.contains_key(&cert.certificate_id) {
                return Err(ConsensusError::IntegrityFault(format!(
                    "apply would recreate certificate {}",
                    cert.certificate_id
                )));
            }
        }
        for cert in &delta.new_certificates {
            self.certificates
                .insert(cert.certificate_id.clone(), cert.clone());
        }
        for project in &delta.new_projects {
            self.projects
                .entry(project.project_id.clone())
                .or_insert_with(|| project.clone());
        }
        for (id, amount) in &delta.assignments {
            let cert = self.require_mut(id)?;
            cert.assigned_amount = cert.assigned_amount.saturating_add(*amount);
        }
        for (id, amount) in &delta.compensations {
            let cert = self.require_mut(id)?;
            cert.compensated_amount = cert.compensated_amount.saturating_add(*amount);
        }
        Ok(())
    }

    /// Undo a previously applied delta, in reverse order.
    pub fn undo(&mut self, delta: &LedgerDelta) -> Result<()> {
        for (id, amount) in delta.compensations.iter().rev() {
            let cert = self.require_mut(id)?;
            cert.compensated_amount = cert.compensated_amount.saturating_sub(*amount);
        }
        for (id, amount) in delta.assignments.iter().rev() {
            let cert = self.require_mut(id)?;
            cert.assigned_amount = cert.assigned_amount.saturating_sub(*amount);
        }
        for project in &delta.new_projects {
            self.projects.remove(&project.project_id);
        }
        for cert in &delta.new_certificates {
            self.certificates.remove(&cert.certificate_id);
        }
        Ok(())
    }

    fn require_mut(&mut self, id: &str) -> Result<&mut Certificate> {
        self.certificates
            .get_mut(id)
            .ok_or_else(|| ConsensusError::IntegrityFault(format!("unknown certificate {}", id)))
    }

    /// Restore from persisted records on startup.
    pub fn load(certificates: Vec<Certificate>, projects: Vec<Project>) -> Self {
        CertificateLedger {
            certificates: certificates
                .into_iter()
                .map(|c| (c.certificate_id.clone(), c))
                .collect(),
            projects: projects
                .into_iter()
                .map(|p| (p.project_id.clone(), p))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cert(id: &str, total: u64) -> Certificate {
        Certificate {
            certificate_id: id.to_string(),
            project_id: "PRJ-1".to_string(),
            total_amount: total,
            assigned_amount: 0,
            compensated_amount: 0,
            issuer_address: "issuer".to_string(),
            standard: "VCS".to_string(),
            location: "Portugal".to_string(),
            issue_date: "2025-01-01".to_string(),
            metadata: BTreeMap::new(),
        }
    }

    fn project() -> Project {
        Project {
            project_id: "PRJ-1".to_string(),
            name: "Reforestation".to_string(),
            project_type: "reforestation".to_string(),
            location: "Portugal".to_string(),
            created_height: 1,
        }
    }

    #[test]
    fn test_certificate_id_pattern() {
        assert!(check_certificate_id("CERT-2025-0001").is_ok());
        assert!(check_certificate_id("CERT-2025-123456").is_ok());
        assert!(check_certificate_id("CERT-25-0001").is_err());
        assert!(check_certificate_id("CERT-2025-001").is_err());
        assert!(check_certificate_id("cert-2025-0001").is_err());
        assert!(check_certificate_id("CERT-2025-00a1").is_err());
        assert!(check_certificate_id("CERT-20250001").is_err());
    }

    #[test]
    fn test_apply_and_undo_round_trip() {
        let mut ledger = CertificateLedger::new();
        let delta = LedgerDelta {
            new_certificates: vec![cert("CERT-2025-0001", 1_000_000)],
            new_projects: vec![project()],
            assignments: vec![("CERT-2025-0001".to_string(), 1000)],
            compensations: vec![("CERT-2025-0001".to_string(), 400)],
        };
        ledger.apply(&delta).unwrap();

        let c = ledger.certificate("CERT-2025-0001").unwrap();
        assert_eq!(c.assigned_amount, 1000);
        assert_eq!(c.compensated_amount, 400);
        assert_eq!(c.remaining(), 600);
        assert!(ledger.project("PRJ-1").is_some());

        ledger.undo(&delta).unwrap();
        assert!(ledger.certificate("CERT-2025-0001").is_none());
        assert!(ledger.project("PRJ-1").is_none());
        assert_eq!(ledger.certificate_count(), 0);
    }

    #[test]
    fn test_undo_keeps_preexisting_state() {
        let mut ledger = CertificateLedger::new();
        let create = LedgerDelta {
            new_certificates: vec![cert("CERT-2025-0001", 1_000_000)],
            new_projects: vec![project()],
            assignments: vec![("CERT-2025-0001".to_string(), 1000)],
            compensations: vec![],
        };
        ledger.apply(&create).unwrap();

        let compensate = LedgerDelta {
            compensations: vec![("CERT-2025-0001".to_string(), 250)],
            ..Default::default()
        };
        ledger.apply(&compensate).unwrap();
        assert_eq!(
            ledger.certificate("CERT-2025-0001").unwrap().compensated_amount,
            250
        );

        ledger.undo(&compensate).unwrap();
        let c = ledger.certificate("CERT-2025-0001").unwrap();
        assert_eq!(c.compensated_amount, 0);
        assert_eq!(c.assigned_amount, 1000);
    }

    #[test]
    fn test_duplicate_certificate_is_fault() {
        let mut ledger = CertificateLedger::new();
        let delta = LedgerDelta {
            new_certificates: vec![cert("CERT-2025-0001", 10)],
            ..Default::default()
        };
        ledger.apply(&delta).unwrap();
        assert!(matches!(
            ledger.apply(&delta),
            Err(ConsensusError::IntegrityFault(_))
        ));
    }

    #[test]
    fn test_load_round_trip() {
        let ledger = CertificateLedger::load(vec![cert("CERT-2025-0007", 5)], vec![project()]);
        assert!(ledger.contains_certificate("CERT-2025-0007"));
        assert_eq!(ledger.project_count(), 1);
    }
}
