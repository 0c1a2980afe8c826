//! Persistent certificate and project records.

use std::sync::Arc;

use anyhow::Result;

use crate::ledger::{Certificate, CertificateLedger, LedgerDelta, Project};
use crate::storage::database::{Database, Tree};

pub struct LedgerStore {
    certificates: Box<dyn Tree>,
    projects: Box<dyn Tree>,
}

impl LedgerStore {
    pub fn new(db: &Arc<dyn Database>) -> Result<Self> {
        Ok(Self {
            certificates: db.open_tree("certificates")?,
            projects: db.open_tree("projects")?,
        })
    }

    pub fn get_certificate(&self, id: &str) -> Result<Option<Certificate>> {
        match self.certificates.get(id.as_bytes())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        match self.projects.get(id.as_bytes())? {
            Some(data) => Ok(Some(bincode::deserialize(&data)?)),
            None => Ok(None),
        }
    }

    /// Write back every record a delta touched, from the post-apply (or
    /// post-undo) in-memory ledger. Records the ledger no longer holds are
    /// deleted.
    pub fn write_touched(&self, ledger: &CertificateLedger, delta: &LedgerDelta) -> Result<()> {
        let touched_certs = delta
            .new_certificates
            .iter()
            .map(|c| c.certificate_id.as_str())
            .chain(delta.assignments.iter().map(|(id, _)| id.as_str()))
            .chain(delta.compensations.iter().map(|(id, _)| id.as_str()));
        for id in touched_certs {
            match ledger.certificate(id) {
                Some(cert) => self
                    .certificates
                    .insert(id.as_bytes(), &bincode::serialize(cert)?)?,
                None => self.certificates.remove(id.as_bytes())?,
            }
        }
        for project in &delta.new_projects {
            match ledger.project(&project.project_id) {
                Some(p) => self
                    .projects
                    .insert(project.project_id.as_bytes(), &bincode::serialize(p)?)?,
                None => self.projects.remove(project.project_id.as_bytes())?,
            }
        }
        Ok(())
    }

    /// Rebuild the full in-memory ledger on startup.
    pub fn load_ledger(&self) -> Result<CertificateLedger> {
        let mut certificates = Vec::new();
        for item in self.certificates.iter() {
            let (_, value) = item?;
            certificates.push(bincode::deserialize(&value)?);
        }
        let mut projects = Vec::new();
        for item in self.projects.iter() {
            let (_, value) = item?;
            projects.push(bincode::deserialize(&value)?);
        }
        Ok(CertificateLedger::load(certificates, projects))
    }

    pub fn certificate_count(&self) -> Result<usize> {
        self.certificates.len()
    }
}
