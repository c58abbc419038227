use std::fmt;

/// Whether a borrower may take out new loans
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Eligibility {
    /// Borrower may take out loans
    #[default]
    Active,
    /// Borrower is blocked from new loans
    Suspended,
}

impl Eligibility {
    /// Get a human-readable description of the eligibility
    #[must_use]
    pub fn get_description(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Suspended => "SUSPENDED",
        }
    }
}

/// A registered library member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Borrower {
    /// Unique member identifier
    id: String,
    /// Full name
    name: String,
    /// Current eligibility for new loans
    eligibility: Eligibility,
}

impl Borrower {
    /// Register a new borrower, eligible by default
    #[must_use]
    pub fn new(id: &str, name: &str) -> Self {
        Self::from_parts(id.to_string(), name.to_string(), Eligibility::Active)
    }

    /// Rebuild a borrower from stored fields
    #[must_use]
    pub fn from_parts(id: String, name: String, eligibility: Eligibility) -> Self {
        Self {
            id,
            name,
            eligibility,
        }
    }

    /// Member identifier
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Full name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current eligibility for new loans
    #[must_use]
    pub fn eligibility(&self) -> Eligibility {
        self.eligibility
    }

    /// Whether new loans are blocked
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.eligibility == Eligibility::Suspended
    }

    pub(crate) fn set_eligibility(&mut self, eligibility: Eligibility) {
        self.eligibility = eligibility;
    }
}

impl fmt::Display for Borrower {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = self.eligibility.get_description();
        write!(f, "{} ({}) {status}", self.name, self.id)
    }
}
