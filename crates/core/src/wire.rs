//! JSON contract between the core and the model backend: instructions sent
//! into a thread (`{"acao": ..., "dados": ...}`) and the structured replies
//! the assistant returns. Key names are part of the deployed assistant
//! prompts and must not drift.

use serde::{Deserialize, Serialize};

/// Reply tag marking a parseable date in scheduling replies.
pub const VALID_DATE_TAG: &str = "DATA VÁLIDA";

/// Closed vocabulary of side effects an assistant reply can name. Codes
/// outside this set are treated as a logged no-op by the routing engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Activity {
    /// Reply to the contact.
    Reply,
    /// Transfer the session to a department.
    Transfer,
    /// End the conversation and reset the contact.
    End,
    /// Hand the contact off to another assistant.
    Handoff,
    /// Check calendar availability.
    AgendaCheck,
    /// Book the chosen slot.
    AgendaBook,
    /// Reschedule an existing event.
    AgendaReschedule,
    /// Cancel an existing event.
    AgendaCancel,
    /// Confirm an existing event.
    AgendaConfirm,
}

impl Activity {
    pub fn parse(code: &str) -> Option<Self> {
        match code {
            "R" => Some(Self::Reply),
            "T" => Some(Self::Transfer),
            "E" => Some(Self::End),
            "M" => Some(Self::Handoff),
            "AG" => Some(Self::AgendaCheck),
            "AG-OK" => Some(Self::AgendaBook),
            "AG-RE" => Some(Self::AgendaReschedule),
            "AG-CN" => Some(Self::AgendaCancel),
            "AG-CF" => Some(Self::AgendaConfirm),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reply => "R",
            Self::Transfer => "T",
            Self::End => "E",
            Self::Handoff => "M",
            Self::AgendaCheck => "AG",
            Self::AgendaBook => "AG-OK",
            Self::AgendaReschedule => "AG-RE",
            Self::AgendaCancel => "AG-CN",
            Self::AgendaConfirm => "AG-CF",
        }
    }
}

/// The assistant's structured output for one event. Produced fresh on every
/// driver run and never persisted. The activity code is kept raw so an
/// unknown code can be logged before being ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub atividade: String,
    pub mensagem: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departamento: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agenda: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assistente: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub midia: Option<String>,
}

impl Response {
    pub fn activity(&self) -> Option<Activity> {
        Activity::parse(&self.atividade)
    }
}

/// Action names understood by the deployed assistant prompts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstructionAction {
    #[serde(rename = "verificar_data_sugerida")]
    CheckSuggestedDate,
    #[serde(rename = "agenda_disponivel")]
    AgendaOpen,
    #[serde(rename = "agenda_fechada")]
    AgendaClosed,
    #[serde(rename = "extrair_data_hora_escolhida")]
    ExtractChosenDatetime,
    #[serde(rename = "retomar_atendimento")]
    ResumeConversation,
    #[serde(rename = "encerrar_conversa")]
    CloseConversation,
    #[serde(rename = "extrair_dados_evento")]
    ExtractEventData,
    #[serde(rename = "extrair_dados_evento_agendado")]
    ExtractBookedEvent,
    #[serde(rename = "extrair_dados_reagendamento")]
    ExtractReschedule,
    #[serde(rename = "extrair_dados_aviso_vencimento")]
    ExtractDueInvoice,
    #[serde(rename = "extrair_dados_inadimplencia")]
    ExtractOverdueInvoice,
    #[serde(rename = "extrair_dados_agradecer_pagamento")]
    ExtractPaymentThanks,
}

/// Per-action payloads. Serialized untagged: the `acao` field already names
/// the shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstructionData {
    /// Date context: "%d/%m/%Y, %A" dates, "%U" week number, PAR/ÍMPAR parity.
    DateContext {
        hoje: String,
        sugestao_inicial: String,
        numero_semana: String,
        semana_par_impar: String,
    },
    /// Availability feedback when the suggested date has open slots.
    OpenAgenda {
        data_sugerida: String,
        disponibilidade: String,
        horario_inicial: String,
        horario_final: String,
        intervalo_tempo: u32,
    },
    /// Availability feedback when every slot is busy.
    ClosedAgenda { disponibilidade: String, titulo_evento: String },
    /// A calendar event handed to the confirmation extraction.
    Event {
        email_agenda: String,
        titulo: String,
        local: String,
        data_hora_inicio: String,
        data_hora_fim: String,
        data_hora_atual: String,
    },
    /// An invoice handed to the billing extractions.
    Invoice {
        nome_cliente: String,
        telefone: String,
        data_vencimento: String,
        data_atual: String,
        descricao_boleto: String,
    },
    /// Gateway contact profile injected on a contact's first thread.
    #[serde(rename_all = "camelCase")]
    ContactProfile { contact_name: String, phone_number: String },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Instruction {
    pub acao: InstructionAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dados: Option<InstructionData>,
}

impl Instruction {
    pub fn new(acao: InstructionAction, dados: Option<InstructionData>) -> Self {
        Self { acao, dados }
    }

    /// The exact text appended to the model thread: pretty-printed JSON with
    /// `dados` omitted when absent.
    pub fn to_wire(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| String::from("{}"))
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_wire())
    }
}

/// Reply to `verificar_data_sugerida` / `agenda_disponivel` / `agenda_fechada`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuggestedDateReply {
    pub data_sugerida: String,
    pub tag: String,
    pub mensagem: String,
}

impl SuggestedDateReply {
    pub fn has_valid_date(&self) -> bool {
        self.tag == VALID_DATE_TAG
    }
}

/// Reply to `extrair_data_hora_escolhida`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingReply {
    pub data_hora_agendamento: String,
    pub titulo_evento: String,
    pub tag: String,
    pub mensagem: String,
}

impl BookingReply {
    pub fn has_valid_date(&self) -> bool {
        self.tag == VALID_DATE_TAG
    }
}

/// Reply to `extrair_dados_evento_agendado`: which event the conversation is
/// about, re-derived from the thread history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLookupReply {
    pub endereco_agenda: String,
    pub titulo: String,
}

/// Reply to `extrair_dados_reagendamento`: event lookup plus the new start.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescheduleReply {
    pub endereco_agenda: String,
    pub titulo: String,
    pub data_nova: String,
}

/// Reply to `extrair_dados_evento`: who to message about tomorrow's event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationReply {
    pub cliente: String,
    pub telefone: String,
    pub resposta_confirmacao: Response,
}

/// Reply to the billing extractions.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingReply {
    pub telefone: String,
    pub resposta: Response,
}

#[cfg(test)]
mod tests {
    use super::{
        Activity, BillingReply, Instruction, InstructionAction, InstructionData, Response,
        SuggestedDateReply, VALID_DATE_TAG,
    };

    #[test]
    fn every_activity_code_round_trips_through_json() {
        for activity in [
            Activity::Reply,
            Activity::Transfer,
            Activity::End,
            Activity::Handoff,
            Activity::AgendaCheck,
            Activity::AgendaBook,
            Activity::AgendaReschedule,
            Activity::AgendaCancel,
            Activity::AgendaConfirm,
        ] {
            let response = Response {
                atividade: activity.as_str().to_string(),
                mensagem: "Olá! Posso ajudar?".to_string(),
                departamento: Some("suporte".to_string()),
                agenda: Some("consultas".to_string()),
                assistente: None,
                midia: None,
            };

            let encoded = serde_json::to_string(&response).expect("encode");
            let decoded: Response = serde_json::from_str(&encoded).expect("decode");
            assert_eq!(decoded, response);
            assert_eq!(decoded.activity(), Some(activity));
            assert_eq!(Activity::parse(activity.as_str()), Some(activity));
        }
    }

    #[test]
    fn unknown_activity_code_parses_to_none() {
        let response: Response =
            serde_json::from_str(r#"{"atividade": "X9", "mensagem": "oi"}"#).expect("decode");
        assert_eq!(response.activity(), None);
        assert_eq!(response.atividade, "X9");
    }

    #[test]
    fn instruction_omits_absent_dados() {
        let instruction = Instruction::new(InstructionAction::ResumeConversation, None);
        let wire = instruction.to_wire();
        assert!(wire.contains(r#""acao": "retomar_atendimento""#));
        assert!(!wire.contains("dados"));
    }

    #[test]
    fn instruction_serializes_date_context_keys() {
        let instruction = Instruction::new(
            InstructionAction::CheckSuggestedDate,
            Some(InstructionData::DateContext {
                hoje: "05/03/2025, Wednesday".to_string(),
                sugestao_inicial: "06/03/2025, Thursday".to_string(),
                numero_semana: "09".to_string(),
                semana_par_impar: "ÍMPAR".to_string(),
            }),
        );

        let wire = instruction.to_wire();
        assert!(wire.contains(r#""acao": "verificar_data_sugerida""#));
        assert!(wire.contains(r#""hoje": "05/03/2025, Wednesday""#));
        assert!(wire.contains(r#""semana_par_impar": "ÍMPAR""#));
    }

    #[test]
    fn contact_profile_uses_camel_case_keys() {
        let instruction = Instruction::new(
            InstructionAction::ExtractEventData,
            Some(InstructionData::ContactProfile {
                contact_name: "Ana".to_string(),
                phone_number: "5511999990000".to_string(),
            }),
        );

        let wire = instruction.to_wire();
        assert!(wire.contains(r#""contactName": "Ana""#));
        assert!(wire.contains(r#""phoneNumber": "5511999990000""#));
    }

    #[test]
    fn scheduling_replies_check_the_valid_date_tag() {
        let valid = SuggestedDateReply {
            data_sugerida: "2025-03-06".to_string(),
            tag: VALID_DATE_TAG.to_string(),
            mensagem: "Que tal amanhã?".to_string(),
        };
        assert!(valid.has_valid_date());

        let invalid = SuggestedDateReply { tag: "DATA INVÁLIDA".to_string(), ..valid };
        assert!(!invalid.has_valid_date());
    }

    #[test]
    fn billing_reply_nests_a_full_response() {
        let raw = r#"{
            "telefone": "5511999990000",
            "resposta": {"atividade": "R", "mensagem": "Seu boleto vence amanhã."}
        }"#;
        let reply: BillingReply = serde_json::from_str(raw).expect("decode");
        assert_eq!(reply.resposta.activity(), Some(Activity::Reply));
    }
}
