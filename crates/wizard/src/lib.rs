//! Connector creation wizard: step machines, configurator resolution and the
//! orchestrator that sequences them.

#![forbid(unsafe_code)]

pub mod configurator;
pub mod configure;
pub mod context;
pub mod review;
pub mod steps;
pub mod wizard;

pub use configurator::{
    ComponentResolver, ConfiguratorDescriptor, ConfiguratorLoader, GenericResolver, ModuleRef, RegistryEntry,
    RegistryResolver, Unavailable,
};
pub use configure::ConfigureStep;
pub use context::{ConfiguratorState, InitialValues, WizardContext};
pub use review::{ReviewDone, ReviewMachine, ReviewState};
pub use steps::{
    ConnectorTypeStep, CoreConfigurationStep, CoreDone, ErrorConfigurationStep, KafkaStep, NameError,
    NamespaceStep, SelectionDone, SelectionState, SelectionStep, StepSignal,
};
pub use wizard::{JumpTarget, StepIndicator, Wizard, WizardStep};
