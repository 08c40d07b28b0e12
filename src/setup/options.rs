use crate::domain::{EntryId, RegisteredDeviceRecord};
use crate::pikvm::DeviceProber;
use crate::registry::{IdentityRegistry, RegistryError, UpsertOutcome};
use crate::setup::discovery::AbortReason;
use crate::setup::flow::{SetupError, SetupOutcome, validate};
use crate::setup::form::{Form, FormErrors, FormStep, FormValues, Translator};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Changes the address or credentials of a registered device.
pub struct OptionsFlow {
    entry_id: EntryId,
    registry: Arc<IdentityRegistry>,
    prober: Arc<dyn DeviceProber>,
    translator: Arc<dyn Translator>,
}

impl OptionsFlow {
    pub fn new(entry_id: EntryId, registry: Arc<IdentityRegistry>, prober: Arc<dyn DeviceProber>, translator: Arc<dyn Translator>) -> Self {
        OptionsFlow {
            entry_id,
            registry,
            prober,
            translator,
        }
    }

    pub fn start(&self) -> SetupOutcome {
        match self.registry.get(self.entry_id) {
            Some(record) => self.show_form(current_values(&record), FormErrors::default()),
            None => SetupOutcome::Aborted(AbortReason::UnknownEntry),
        }
    }

    /// Re-validates the device with the new values. If the serial now answering belongs to
    /// another entry, that entry is updated instead.
    #[instrument(skip_all, fields(entry_id = %self.entry_id))]
    pub async fn submit(&self, values: FormValues) -> SetupOutcome {
        info!("🔧 Updating options for {}...", values.host);
        match self.apply(&values).await {
            Ok(outcome) => {
                info!(entry_id = %outcome.entry_id(), "🔧 Updating options for {}... OK", values.host);
                SetupOutcome::UpdatedExisting(outcome.entry_id())
            }
            Err(SetupError::Registry(RegistryError::UnknownEntry(_))) => SetupOutcome::Aborted(AbortReason::UnknownEntry),
            Err(e) => {
                warn!("⚠️ Updating options for {}... failed, {}", values.host, e);
                self.show_form(values, FormErrors::base(e.code()))
            }
        }
    }

    async fn apply(&self, values: &FormValues) -> Result<UpsertOutcome, SetupError> {
        let registration = validate(self.prober.as_ref(), values).await?;
        Ok(self.registry.update(self.entry_id, registration)?)
    }

    fn show_form(&self, values: FormValues, errors: FormErrors) -> SetupOutcome {
        SetupOutcome::ShowForm(Form::new(FormStep::Options, values, errors, self.translator.as_ref()))
    }
}

fn current_values(record: &RegisteredDeviceRecord) -> FormValues {
    FormValues {
        host: record.connection.base_url.clone(),
        username: record.connection.username.clone(),
        password: record.connection.password.clone(),
        totp: record.connection.totp_seed.clone().map(String::from).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pikvm::ProbeError;
    use crate::registry::Registration;
    use crate::setup::fake::FakeProber;
    use crate::setup::form::{BASE, NoTranslations};
    use pretty_assertions::assert_eq;
    use test_log::test;

    fn options(registry: &Arc<IdentityRegistry>, entry_id: EntryId, prober: FakeProber) -> OptionsFlow {
        OptionsFlow::new(entry_id, registry.clone(), Arc::new(prober), Arc::new(NoTranslations))
    }

    fn registered(serials: &[&str]) -> (Arc<IdentityRegistry>, Vec<EntryId>) {
        let registry = Arc::new(IdentityRegistry::new());
        let entry_ids = serials
            .iter()
            .enumerate()
            .filter_map(|(i, serial)| registry.upsert(Registration::fixture(serial, &format!("10.0.0.{}", i + 5))).ok())
            .map(|outcome| outcome.entry_id())
            .collect();
        (registry, entry_ids)
    }

    fn values(host: &str, password: &str) -> FormValues {
        FormValues {
            host: host.to_string(),
            username: "admin".to_string(),
            password: password.to_string(),
            totp: String::new(),
        }
    }

    #[test]
    fn start_prefills_the_current_entry() {
        let (registry, entry_ids) = registered(&["S1"]);

        let SetupOutcome::ShowForm(form) = options(&registry, entry_ids[0], FakeProber::identity("S1", None)).start() else {
            panic!("expected the form");
        };

        assert_eq!(form.step, FormStep::Options);
        assert_eq!(form.values, values("https://10.0.0.5", "secret"));
    }

    #[test]
    fn start_aborts_for_a_removed_entry() {
        let (registry, _) = registered(&[]);

        let outcome = options(&registry, EntryId::new(), FakeProber::identity("S1", None)).start();

        assert_eq!(outcome, SetupOutcome::Aborted(AbortReason::UnknownEntry));
    }

    #[test(tokio::test)]
    async fn submit_updates_the_entry() {
        let (registry, entry_ids) = registered(&["S1"]);
        let flow = options(&registry, entry_ids[0], FakeProber::identity("S1", None));

        let outcome = flow.submit(values("10.0.0.99", "changed")).await;

        assert_eq!(outcome, SetupOutcome::UpdatedExisting(entry_ids[0]));
        let record = registry.get(entry_ids[0]);
        assert_eq!(record.as_ref().map(|r| r.connection.base_url.as_str()), Some("https://10.0.0.99"));
        assert_eq!(record.as_ref().map(|r| r.connection.password.as_str()), Some("changed"));
        assert_eq!(registry.records().len(), 1);
    }

    #[test(tokio::test)]
    async fn submit_updates_the_entry_that_owns_the_probed_serial() {
        let (registry, entry_ids) = registered(&["S1", "S2"]);
        let flow = options(&registry, entry_ids[0], FakeProber::identity("S2", None));

        let outcome = flow.submit(values("10.0.0.99", "changed")).await;

        assert_eq!(outcome, SetupOutcome::UpdatedExisting(entry_ids[1]));
        assert_eq!(registry.get(entry_ids[1]).map(|r| r.connection.base_url.clone()), Some("https://10.0.0.99".to_string()));
        assert_eq!(registry.get(entry_ids[0]).map(|r| r.connection.base_url.clone()), Some("https://10.0.0.5".to_string()));
    }

    #[test(tokio::test)]
    async fn submit_takes_over_a_replaced_device() {
        let (registry, entry_ids) = registered(&["S1"]);
        let flow = options(&registry, entry_ids[0], FakeProber::identity("S9", None));

        let outcome = flow.submit(values("10.0.0.5", "secret")).await;

        assert_eq!(outcome, SetupOutcome::UpdatedExisting(entry_ids[0]));
        assert_eq!(registry.find("S9").map(|r| r.entry_id), Some(entry_ids[0]));
    }

    #[test(tokio::test)]
    async fn submit_shows_the_error_on_the_options_form() {
        let (registry, entry_ids) = registered(&["S1"]);
        let flow = options(&registry, entry_ids[0], FakeProber::failing(ProbeError::MalformedResponse));

        let SetupOutcome::ShowForm(form) = flow.submit(values("10.0.0.99", "changed")).await else {
            panic!("expected the form");
        };

        assert_eq!(form.step, FormStep::Options);
        assert_eq!(form.errors.get(BASE), Some("malformed_response"));
        assert_eq!(registry.get(entry_ids[0]).map(|r| r.connection.base_url.clone()), Some("https://10.0.0.5".to_string()));
    }
}
