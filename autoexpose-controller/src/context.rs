use crate::config::Config;
use crate::index::ExistingResourceIndex;
use crate::naming::NameScheme;
use crate::policy::EligibilityPolicy;
use crate::writer::ResourceWriter;

/// Shared by the reconcilers of every resource kind.
pub struct Context<I: ExistingResourceIndex, W: ResourceWriter> {
    pub policy: EligibilityPolicy,
    pub naming: NameScheme,
    pub public_dns_domain: String,
    pub index: I,
    pub writer: W,
}

impl<I: ExistingResourceIndex, W: ResourceWriter> Context<I, W> {
    pub fn new(config: &Config, index: I, writer: W) -> Self {
        Self {
            policy: EligibilityPolicy::new(config),
            naming: NameScheme::new(config),
            public_dns_domain: config.public_dns_domain.clone(),
            index,
            writer,
        }
    }
}
