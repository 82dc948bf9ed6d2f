//! Turns one assistant [`Response`] into exactly one terminal side effect,
//! keyed by its activity code. Unknown codes are logged and ignored;
//! unresolved shortcuts abort the event with an error the caller logs.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use frontdesk_core::domain::assistant::Assistant;
use frontdesk_core::domain::contact::Contact;
use frontdesk_core::domain::tenant::Tenant;
use frontdesk_core::wire::{Activity, Response};
use frontdesk_core::{ApplicationError, DomainError, ReferenceKind};
use frontdesk_db::{ContactRepository, DirectoryRepository};
use frontdesk_gateway::calendar::CalendarClient;
use frontdesk_gateway::chat::{ChatGateway, OutboundMedia};
use frontdesk_gateway::crm::CrmClient;

use crate::driver::{ConversationDriver, DriveOutcome, DriveRequest};
use crate::scheduling::SchedulingFlow;
use crate::{gateway_failure, persistence_failure};

/// The adapters available to one routing decision. Chat is always present;
/// calendar and CRM depend on the tenant's provider selectors.
#[derive(Clone, Copy)]
pub struct AdapterSet<'a> {
    pub chat: &'a dyn ChatGateway,
    pub calendar: Option<&'a dyn CalendarClient>,
    pub crm: Option<&'a dyn CrmClient>,
}

#[derive(Clone, Copy)]
pub struct RouteRequest<'a> {
    pub tenant: &'a Tenant,
    pub contact: &'a Contact,
    pub assistant: &'a Assistant,
    pub response: &'a Response,
    /// Pre-rendered audio payload; when set, message delivery sends this
    /// instead of text.
    pub audio_reply_url: Option<&'a str>,
    pub adapters: AdapterSet<'a>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    Transferred,
    Closed,
    HandedOff,
    Ignored,
}

pub struct RoutingEngine {
    directory: Arc<dyn DirectoryRepository>,
    contacts: Arc<dyn ContactRepository>,
    driver: Arc<ConversationDriver>,
    scheduling: SchedulingFlow,
}

impl RoutingEngine {
    pub fn new(
        directory: Arc<dyn DirectoryRepository>,
        contacts: Arc<dyn ContactRepository>,
        driver: Arc<ConversationDriver>,
    ) -> Self {
        let scheduling =
            SchedulingFlow::new(directory.clone(), contacts.clone(), driver.clone());
        Self { directory, contacts, driver, scheduling }
    }

    pub async fn route(
        &self,
        request: RouteRequest<'_>,
    ) -> Result<RouteOutcome, ApplicationError> {
        let Some(activity) = request.response.activity() else {
            warn!(
                event_name = "unknown_activity_code",
                tenant = %request.tenant.slug,
                code = %request.response.atividade,
                "ignoring response"
            );
            return Ok(RouteOutcome::Ignored);
        };

        info!(
            event_name = "routing_activity",
            tenant = %request.tenant.slug,
            contact = %request.contact.external_id,
            activity = activity.as_str(),
        );

        match activity {
            Activity::Reply => self.reply(&request).await,
            Activity::Transfer => self.transfer(&request).await,
            Activity::End => self.end(&request).await,
            Activity::Handoff => self.handoff(&request).await,
            Activity::AgendaCheck => {
                let calendar = calendar_required(&request)?;
                let message = self
                    .scheduling
                    .suggest_availability(
                        request.tenant,
                        request.contact,
                        request.response.agenda.as_deref(),
                        calendar,
                    )
                    .await?;
                self.deliver_text(&request, message.as_deref().unwrap_or_default()).await?;
                Ok(RouteOutcome::Delivered)
            }
            Activity::AgendaBook => {
                let calendar = calendar_required(&request)?;
                let message = self
                    .scheduling
                    .book(
                        request.tenant,
                        request.contact,
                        request.response.agenda.as_deref(),
                        calendar,
                        request.adapters.crm,
                    )
                    .await?;
                self.deliver_text(&request, message.as_deref().unwrap_or_default()).await?;
                Ok(RouteOutcome::Delivered)
            }
            Activity::AgendaReschedule => {
                let calendar = calendar_required(&request)?;
                self.scheduling
                    .reschedule(request.tenant, request.contact, calendar, request.adapters.crm)
                    .await?;
                self.deliver(&request).await?;
                self.close_and_reset(&request).await?;
                Ok(RouteOutcome::Closed)
            }
            Activity::AgendaCancel => {
                let calendar = calendar_required(&request)?;
                self.scheduling
                    .cancel(request.tenant, request.contact, calendar, request.adapters.crm)
                    .await?;
                self.deliver(&request).await?;
                self.close_and_reset(&request).await?;
                Ok(RouteOutcome::Closed)
            }
            Activity::AgendaConfirm => {
                let calendar = calendar_required(&request)?;
                self.scheduling
                    .confirm(request.tenant, request.contact, calendar, request.adapters.crm)
                    .await?;
                self.deliver(&request).await?;
                self.close_and_reset(&request).await?;
                Ok(RouteOutcome::Closed)
            }
        }
    }

    /// Message delivery honoring the audio flag.
    async fn deliver(&self, request: &RouteRequest<'_>) -> Result<(), ApplicationError> {
        match request.audio_reply_url {
            Some(url) => request
                .adapters
                .chat
                .send_audio(&request.contact.external_id, url)
                .await
                .map_err(gateway_failure),
            None => self.deliver_text(request, &request.response.mensagem).await,
        }
    }

    async fn deliver_text(
        &self,
        request: &RouteRequest<'_>,
        text: &str,
    ) -> Result<(), ApplicationError> {
        if text.is_empty() {
            return Ok(());
        }
        request
            .adapters
            .chat
            .send_text(&request.contact.external_id, &request.assistant.name, text)
            .await
            .map_err(gateway_failure)
    }

    async fn reply(&self, request: &RouteRequest<'_>) -> Result<RouteOutcome, ApplicationError> {
        self.deliver(request).await?;
        if let Some(shortcut) = request.response.midia.as_deref() {
            let asset = self
                .directory
                .find_media_by_shortcut(&request.tenant.id, shortcut)
                .await
                .map_err(persistence_failure)?
                .ok_or_else(|| DomainError::UnresolvedReference {
                    kind: ReferenceKind::Media,
                    shortcut: shortcut.to_string(),
                })?;
            request
                .adapters
                .chat
                .send_media(
                    &request.contact.external_id,
                    &request.assistant.name,
                    OutboundMedia { asset: &asset, message: None },
                )
                .await
                .map_err(gateway_failure)?;
        }
        Ok(RouteOutcome::Delivered)
    }

    async fn transfer(
        &self,
        request: &RouteRequest<'_>,
    ) -> Result<RouteOutcome, ApplicationError> {
        let shortcut = request.response.departamento.as_deref().unwrap_or_default();
        let department = self
            .directory
            .find_department_by_shortcut(&request.tenant.id, shortcut)
            .await
            .map_err(persistence_failure)?
            .ok_or_else(|| DomainError::UnresolvedReference {
                kind: ReferenceKind::Department,
                shortcut: shortcut.to_string(),
            })?;

        self.deliver(request).await?;
        self.contacts
            .set_awaiting_human(&request.contact.id, true, Utc::now())
            .await
            .map_err(persistence_failure)?;
        request
            .adapters
            .chat
            .transfer_session(&request.contact.external_id, &department)
            .await
            .map_err(gateway_failure)?;
        Ok(RouteOutcome::Transferred)
    }

    async fn end(&self, request: &RouteRequest<'_>) -> Result<RouteOutcome, ApplicationError> {
        self.deliver(request).await?;
        self.close_and_reset(request).await?;
        Ok(RouteOutcome::Closed)
    }

    /// Gateway close is best-effort; the contact reset happens regardless.
    async fn close_and_reset(
        &self,
        request: &RouteRequest<'_>,
    ) -> Result<(), ApplicationError> {
        if let Err(error) =
            request.adapters.chat.close_session(&request.contact.external_id).await
        {
            warn!(
                event_name = "session_close_failed",
                tenant = %request.tenant.slug,
                contact = %request.contact.external_id,
                error = %error,
                "resetting the contact anyway"
            );
        }
        self.contacts
            .reset(&request.contact.id, Utc::now())
            .await
            .map_err(persistence_failure)
    }

    /// `M`: hand the conversation to another assistant on the same thread.
    async fn handoff(
        &self,
        request: &RouteRequest<'_>,
    ) -> Result<RouteOutcome, ApplicationError> {
        let shortcut = request.response.assistente.as_deref().unwrap_or_default();
        let target = self
            .directory
            .find_assistant_by_shortcut(&request.tenant.id, shortcut)
            .await
            .map_err(persistence_failure)?
            .ok_or_else(|| DomainError::UnresolvedReference {
                kind: ReferenceKind::Assistant,
                shortcut: shortcut.to_string(),
            })?;

        self.deliver(request).await?;

        // The new assistant reads the existing history; no new user input.
        let tools = crate::tools::tenant_registry(
            request.tenant.timezone,
            self.directory.clone(),
            request.tenant.id.clone(),
        );
        let outcome: DriveOutcome<Response> = self
            .driver
            .drive(&target, DriveRequest::on_thread(request.contact.thread_id.as_deref()), &tools)
            .await?;
        if outcome.created_thread {
            self.contacts
                .set_thread(&request.contact.id, &outcome.thread_id, Utc::now())
                .await
                .map_err(persistence_failure)?;
        }
        self.contacts
            .set_assistant(&request.contact.id, &target.id, Utc::now())
            .await
            .map_err(persistence_failure)?;

        let handoff_request =
            RouteRequest { assistant: &target, audio_reply_url: None, ..*request };
        self.deliver_text(&handoff_request, &outcome.reply.mensagem).await?;
        Ok(RouteOutcome::HandedOff)
    }
}

fn calendar_required<'a>(
    request: &RouteRequest<'a>,
) -> Result<&'a dyn CalendarClient, ApplicationError> {
    request.adapters.calendar.ok_or_else(|| {
        ApplicationError::Configuration("tenant has no calendar provider configured".to_string())
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::Utc;

    use frontdesk_core::domain::directory::Department;
    use frontdesk_core::wire::Response;
    use frontdesk_core::{ApplicationError, DomainError, ReferenceKind};
    use frontdesk_db::repositories::{
        SqlContactRepository, SqlDirectoryRepository, SqlTenantRepository,
    };
    use frontdesk_db::{
        connect_with_settings, fixtures, migrations, ContactRepository, DirectoryRepository,
        TenantRepository,
    };
    use frontdesk_gateway::chat::{ChatContactProfile, ChatGateway, OutboundMedia};
    use frontdesk_gateway::GatewayError;

    use crate::backend::{
        BackendError, RunHandle, RunState, ThreadBackend, ThreadMessage, ToolOutput,
    };
    use crate::driver::{ConversationDriver, DriverSettings};

    use super::{AdapterSet, RouteOutcome, RouteRequest, RoutingEngine};

    /// Backend for routes that never reach the model.
    struct UnreachableBackend;

    #[async_trait]
    impl ThreadBackend for UnreachableBackend {
        async fn create_thread(
            &self,
            _messages: &[ThreadMessage],
        ) -> Result<String, BackendError> {
            Err(BackendError::Transport {
                operation: "create_thread",
                reason: "not expected in this test".to_string(),
            })
        }

        async fn append_message(
            &self,
            _thread_id: &str,
            _message: &ThreadMessage,
        ) -> Result<(), BackendError> {
            Ok(())
        }

        async fn start_run(
            &self,
            _assistant_external_id: &str,
            _thread_id: &str,
            _instructions: Option<&str>,
        ) -> Result<RunHandle, BackendError> {
            Err(BackendError::Transport {
                operation: "start_run",
                reason: "not expected in this test".to_string(),
            })
        }

        async fn poll_run(&self, _handle: &RunHandle) -> Result<RunState, BackendError> {
            Ok(RunState::Completed)
        }

        async fn submit_tool_outputs(
            &self,
            _handle: &RunHandle,
            _outputs: &[ToolOutput],
        ) -> Result<(), BackendError> {
            Ok(())
        }

        async fn latest_message(&self, _thread_id: &str) -> Result<String, BackendError> {
            Ok("{}".to_string())
        }
    }

    #[derive(Default)]
    struct RecordingChat {
        calls: Mutex<Vec<String>>,
        fail_close: bool,
    }

    impl RecordingChat {
        fn failing_close() -> Self {
            Self { calls: Mutex::new(Vec::new()), fail_close: true }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: String) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait]
    impl ChatGateway for RecordingChat {
        async fn send_text(
            &self,
            contact_id: &str,
            assistant_name: &str,
            text: &str,
        ) -> Result<(), GatewayError> {
            self.record(format!("text:{contact_id}:{assistant_name}:{text}"));
            Ok(())
        }

        async fn send_media(
            &self,
            contact_id: &str,
            _assistant_name: &str,
            media: OutboundMedia<'_>,
        ) -> Result<(), GatewayError> {
            self.record(format!("media:{contact_id}:{}", media.asset.shortcut));
            Ok(())
        }

        async fn send_audio(
            &self,
            contact_id: &str,
            audio_url: &str,
        ) -> Result<(), GatewayError> {
            self.record(format!("audio:{contact_id}:{audio_url}"));
            Ok(())
        }

        async fn transfer_session(
            &self,
            contact_id: &str,
            department: &Department,
        ) -> Result<(), GatewayError> {
            self.record(format!("transfer:{contact_id}:{}", department.shortcut));
            Ok(())
        }

        async fn close_session(&self, contact_id: &str) -> Result<(), GatewayError> {
            self.record(format!("close:{contact_id}"));
            if self.fail_close {
                return Err(GatewayError::UnexpectedPayload {
                    provider: "fake",
                    reason: "ticket already closed".to_string(),
                });
            }
            Ok(())
        }

        async fn contact_profile(
            &self,
            _contact_id: &str,
        ) -> Result<ChatContactProfile, GatewayError> {
            Ok(ChatContactProfile::default())
        }

        async fn resolve_contact_id(
            &self,
            phone: &str,
            _name: &str,
        ) -> Result<String, GatewayError> {
            Ok(phone.to_string())
        }
    }

    struct Setup {
        engine: RoutingEngine,
        contacts: Arc<SqlContactRepository>,
        tenant: frontdesk_core::domain::tenant::Tenant,
        contact: frontdesk_core::domain::contact::Contact,
        assistant: frontdesk_core::domain::assistant::Assistant,
    }

    async fn setup() -> Setup {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        let seed = fixtures::seed_demo_tenant(&pool).await.expect("seed");

        let tenants = SqlTenantRepository::new(pool.clone());
        let directory = Arc::new(SqlDirectoryRepository::new(pool.clone()));
        let contacts = Arc::new(SqlContactRepository::new(pool.clone()));

        let tenant = tenants
            .find_by_slug_and_token(seed.slug, seed.webhook_token)
            .await
            .expect("tenant query")
            .expect("seeded tenant");
        let contact = contacts
            .find_or_create(
                &tenant.id,
                "5511999990000@c.us",
                Some(&seed.responder_id),
                Utc::now(),
            )
            .await
            .expect("contact");
        let assistant = directory
            .find_assistant(&seed.responder_id)
            .await
            .expect("assistant query")
            .expect("seeded assistant");

        let driver = Arc::new(ConversationDriver::new(
            Arc::new(UnreachableBackend),
            DriverSettings::default(),
        ));
        let engine = RoutingEngine::new(directory, contacts.clone(), driver);
        Setup { engine, contacts, tenant, contact, assistant }
    }

    fn response(atividade: &str, mensagem: &str) -> Response {
        Response {
            atividade: atividade.to_string(),
            mensagem: mensagem.to_string(),
            departamento: None,
            agenda: None,
            assistente: None,
            midia: None,
        }
    }

    #[tokio::test]
    async fn reply_with_media_sends_text_then_the_asset() {
        let ctx = setup().await;
        let chat = RecordingChat::default();
        let mut reply = response("R", "Segue a tabela de preços.");
        reply.midia = Some("tabela-precos".to_string());

        let outcome = ctx
            .engine
            .route(RouteRequest {
                tenant: &ctx.tenant,
                contact: &ctx.contact,
                assistant: &ctx.assistant,
                response: &reply,
                audio_reply_url: None,
                adapters: AdapterSet { chat: &chat, calendar: None, crm: None },
            })
            .await
            .expect("route");

        assert_eq!(outcome, RouteOutcome::Delivered);
        let calls = chat.calls();
        assert_eq!(calls.len(), 2);
        assert!(calls[0].starts_with("text:5511999990000@c.us:Recepção:"));
        assert_eq!(calls[1], "media:5511999990000@c.us:tabela-precos");
    }

    #[tokio::test]
    async fn unknown_activity_is_ignored_without_a_send() {
        let ctx = setup().await;
        let chat = RecordingChat::default();
        let reply = response("XYZ", "não deveria sair");

        let outcome = ctx
            .engine
            .route(RouteRequest {
                tenant: &ctx.tenant,
                contact: &ctx.contact,
                assistant: &ctx.assistant,
                response: &reply,
                audio_reply_url: None,
                adapters: AdapterSet { chat: &chat, calendar: None, crm: None },
            })
            .await
            .expect("route");

        assert_eq!(outcome, RouteOutcome::Ignored);
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn end_resets_the_contact_even_when_the_close_fails() {
        let ctx = setup().await;
        ctx.contacts
            .set_thread(&ctx.contact.id, "thread_abc", Utc::now())
            .await
            .expect("set thread");
        let chat = RecordingChat::failing_close();
        let reply = response("E", "Até logo!");

        let outcome = ctx
            .engine
            .route(RouteRequest {
                tenant: &ctx.tenant,
                contact: &ctx.contact,
                assistant: &ctx.assistant,
                response: &reply,
                audio_reply_url: None,
                adapters: AdapterSet { chat: &chat, calendar: None, crm: None },
            })
            .await
            .expect("route");

        assert_eq!(outcome, RouteOutcome::Closed);
        let refreshed = ctx
            .contacts
            .find_by_external_id(&ctx.tenant.id, &ctx.contact.external_id)
            .await
            .expect("query")
            .expect("contact");
        assert_eq!(refreshed.thread_id, None);
        assert_eq!(refreshed.recall_count, 0);
    }

    #[tokio::test]
    async fn transfer_flags_the_contact_and_moves_the_session() {
        let ctx = setup().await;
        let chat = RecordingChat::default();
        let mut reply = response("T", "Vou te passar para o comercial.");
        reply.departamento = Some("comercial".to_string());

        let outcome = ctx
            .engine
            .route(RouteRequest {
                tenant: &ctx.tenant,
                contact: &ctx.contact,
                assistant: &ctx.assistant,
                response: &reply,
                audio_reply_url: None,
                adapters: AdapterSet { chat: &chat, calendar: None, crm: None },
            })
            .await
            .expect("route");

        assert_eq!(outcome, RouteOutcome::Transferred);
        assert_eq!(chat.calls().last().unwrap(), "transfer:5511999990000@c.us:comercial");
        let refreshed = ctx
            .contacts
            .find_by_external_id(&ctx.tenant.id, &ctx.contact.external_id)
            .await
            .expect("query")
            .expect("contact");
        assert!(refreshed.awaiting_human);
    }

    #[tokio::test]
    async fn unresolved_department_aborts_before_any_send() {
        let ctx = setup().await;
        let chat = RecordingChat::default();
        let mut reply = response("T", "transferindo");
        reply.departamento = Some("inexistente".to_string());

        let error = ctx
            .engine
            .route(RouteRequest {
                tenant: &ctx.tenant,
                contact: &ctx.contact,
                assistant: &ctx.assistant,
                response: &reply,
                audio_reply_url: None,
                adapters: AdapterSet { chat: &chat, calendar: None, crm: None },
            })
            .await
            .expect_err("should fail");

        assert!(matches!(
            error,
            ApplicationError::Domain(DomainError::UnresolvedReference {
                kind: ReferenceKind::Department,
                ..
            })
        ));
        assert!(chat.calls().is_empty());
    }

    #[tokio::test]
    async fn audio_flag_replaces_the_text_send() {
        let ctx = setup().await;
        let chat = RecordingChat::default();
        let reply = response("R", "texto que vira áudio");

        ctx.engine
            .route(RouteRequest {
                tenant: &ctx.tenant,
                contact: &ctx.contact,
                assistant: &ctx.assistant,
                response: &reply,
                audio_reply_url: Some("https://cdn.example/resposta.ogg"),
                adapters: AdapterSet { chat: &chat, calendar: None, crm: None },
            })
            .await
            .expect("route");

        assert_eq!(
            chat.calls(),
            vec!["audio:5511999990000@c.us:https://cdn.example/resposta.ogg".to_string()]
        );
    }
}
