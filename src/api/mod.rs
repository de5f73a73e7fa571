mod appwrapper;

pub use appwrapper::{
    AppWrapper, AppWrapperComponent, AppWrapperComponentStatus, AppWrapperPodSet, AppWrapperSpec, AppWrapperStatus, ConditionType, Phase,
};

pub const APPWRAPPER_LABEL: &str = "workload.codeflare.dev/appwrapper";
pub const APPWRAPPER_FINALIZER: &str = "workload.codeflare.dev/finalizer";

pub const ADMISSION_GRACE_PERIOD_ANNOTATION: &str = "workload.codeflare.dev.appwrapper/admissionGracePeriodDuration";
pub const WARMUP_GRACE_PERIOD_ANNOTATION: &str = "workload.codeflare.dev.appwrapper/warmupGracePeriodDuration";
pub const FAILURE_GRACE_PERIOD_ANNOTATION: &str = "workload.codeflare.dev.appwrapper/failureGracePeriodDuration";
pub const RETRY_PAUSE_PERIOD_ANNOTATION: &str = "workload.codeflare.dev.appwrapper/retryPausePeriodDuration";
pub const RETRY_LIMIT_ANNOTATION: &str = "workload.codeflare.dev.appwrapper/retryLimit";
pub const FORCEFUL_DELETION_GRACE_PERIOD_ANNOTATION: &str = "workload.codeflare.dev.appwrapper/forcefulDeletionGracePeriodDuration";
pub const DELETION_ON_FAILURE_GRACE_PERIOD_ANNOTATION: &str = "workload.codeflare.dev.appwrapper/deletionOnFailureGracePeriodDuration";
pub const SUCCESS_TTL_ANNOTATION: &str = "workload.codeflare.dev.appwrapper/successTTLDuration";
