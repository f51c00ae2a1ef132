//! Explicit delete-cascade rules between clinic tables.
//!
//! Deleting a row from a parent table first deletes every dependent row
//! listed here, walking the rules recursively so that grandchildren
//! (e.g. a patient's appointments' payments) go too.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Patients,
    Providers,
    Services,
    ProviderServices,
    Appointments,
    Payments,
}

impl Table {
    pub fn name(&self) -> &'static str {
        match self {
            Table::Patients => "patients",
            Table::Providers => "providers",
            Table::Services => "services",
            Table::ProviderServices => "provider_services",
            Table::Appointments => "appointments",
            Table::Payments => "payments",
        }
    }

    /// Single-column primary key, if the table has one.
    pub fn primary_key(&self) -> Option<&'static str> {
        match self {
            Table::Patients => Some("patient_id"),
            Table::Providers => Some("provider_id"),
            Table::Services => Some("service_id"),
            Table::Appointments => Some("appointment_id"),
            Table::Payments => Some("payment_id"),
            // composite (provider_id, service_id)
            Table::ProviderServices => None,
        }
    }

    pub fn rest_path(&self) -> String {
        format!("/rest/v1/{}", self.name())
    }

    /// Rules whose parent is this table, in declaration order.
    pub fn dependents(&self) -> impl Iterator<Item = &'static CascadeRule> + '_ {
        CASCADE_RULES.iter().filter(move |rule| rule.parent == *self)
    }

    pub fn has_dependents(&self) -> bool {
        self.dependents().next().is_some()
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CascadeRule {
    pub parent: Table,
    pub child: Table,
    /// Column on `child` referencing the parent's primary key.
    pub foreign_key: &'static str,
}

pub const CASCADE_RULES: &[CascadeRule] = &[
    CascadeRule { parent: Table::Patients, child: Table::Appointments, foreign_key: "patient_id" },
    CascadeRule { parent: Table::Providers, child: Table::Appointments, foreign_key: "provider_id" },
    CascadeRule { parent: Table::Providers, child: Table::ProviderServices, foreign_key: "provider_id" },
    CascadeRule { parent: Table::Services, child: Table::ProviderServices, foreign_key: "service_id" },
    CascadeRule { parent: Table::Services, child: Table::Appointments, foreign_key: "service_id" },
    CascadeRule { parent: Table::Appointments, child: Table::Payments, foreign_key: "appointment_id" },
];
