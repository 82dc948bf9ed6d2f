//! Builders for the instruction payloads appended to model threads. Key
//! names and date formats are part of the deployed assistant prompts; see
//! `frontdesk_core::wire`.

use chrono::{DateTime, Datelike, NaiveDate};
use chrono_tz::Tz;

use frontdesk_core::availability::CalendarEvent;
use frontdesk_core::wire::{Instruction, InstructionAction, InstructionData};

const DAY_FORMAT: &str = "%d/%m/%Y, %A";
const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn week_parity(week_number: u32) -> &'static str {
    if week_number % 2 == 0 {
        "PAR"
    } else {
        "ÍMPAR"
    }
}

fn date_context(now: DateTime<Tz>, with_suggestion: bool) -> InstructionData {
    let tomorrow = now + chrono::Duration::days(1);
    // Sunday-based week number, like the prompts were trained on.
    let week = now.format("%U").to_string();
    let parity = week_parity(week.parse().unwrap_or(now.iso_week().week()));
    InstructionData::DateContext {
        hoje: now.format(DAY_FORMAT).to_string(),
        sugestao_inicial: if with_suggestion {
            tomorrow.format(DAY_FORMAT).to_string()
        } else {
            String::new()
        },
        numero_semana: if with_suggestion { week } else { String::new() },
        semana_par_impar: if with_suggestion { parity.to_string() } else { String::new() },
    }
}

/// `verificar_data_sugerida` with today, tomorrow, week number, and parity.
pub fn check_suggested_date(now: DateTime<Tz>) -> Instruction {
    Instruction::new(InstructionAction::CheckSuggestedDate, Some(date_context(now, true)))
}

/// `extrair_data_hora_escolhida`: date context with empty suggestion fields.
pub fn extract_chosen_datetime(now: DateTime<Tz>) -> Instruction {
    Instruction::new(InstructionAction::ExtractChosenDatetime, Some(date_context(now, false)))
}

/// Availability feedback for a date with open slots.
pub fn agenda_open(
    suggested_date: &str,
    bitmap: &str,
    window_start: &str,
    window_end: &str,
    slot_minutes: u32,
) -> Instruction {
    Instruction::new(
        InstructionAction::AgendaOpen,
        Some(InstructionData::OpenAgenda {
            data_sugerida: suggested_date.to_string(),
            disponibilidade: bitmap.to_string(),
            horario_inicial: window_start.to_string(),
            horario_final: window_end.to_string(),
            intervalo_tempo: slot_minutes,
        }),
    )
}

/// Availability feedback when every slot is busy.
pub fn agenda_closed(bitmap: &str, first_event_title: &str) -> Instruction {
    Instruction::new(
        InstructionAction::AgendaClosed,
        Some(InstructionData::ClosedAgenda {
            disponibilidade: bitmap.to_string(),
            titulo_evento: first_event_title.to_string(),
        }),
    )
}

/// `extrair_dados_evento_agendado` (cancel/confirm lookups).
pub fn lookup_booked_event() -> Instruction {
    Instruction::new(InstructionAction::ExtractBookedEvent, None)
}

/// `extrair_dados_reagendamento` (reschedule lookup).
pub fn lookup_reschedule() -> Instruction {
    Instruction::new(InstructionAction::ExtractReschedule, None)
}

/// `extrair_dados_evento`: one tomorrow's-appointment event handed to the
/// confirmation assistant.
pub fn extract_event(agenda_address: &str, event: &CalendarEvent, now: DateTime<Tz>) -> Instruction {
    let timezone = now.timezone();
    Instruction::new(
        InstructionAction::ExtractEventData,
        Some(InstructionData::Event {
            email_agenda: agenda_address.to_string(),
            titulo: event.title.clone(),
            local: event.location.clone().unwrap_or_default(),
            data_hora_inicio: event
                .start
                .with_timezone(&timezone)
                .format(LOCAL_FORMAT)
                .to_string(),
            data_hora_fim: event.end.with_timezone(&timezone).format(LOCAL_FORMAT).to_string(),
            data_hora_atual: now.format(LOCAL_FORMAT).to_string(),
        }),
    )
}

/// One billing extraction (`extrair_dados_aviso_vencimento`,
/// `extrair_dados_inadimplencia`, or `extrair_dados_agradecer_pagamento`).
pub fn extract_invoice(
    action: InstructionAction,
    customer_name: &str,
    phone: &str,
    due_date: NaiveDate,
    now: DateTime<Tz>,
    description: &str,
) -> Instruction {
    Instruction::new(
        action,
        Some(InstructionData::Invoice {
            nome_cliente: customer_name.to_string(),
            telefone: phone.to_string(),
            data_vencimento: due_date.format("%Y-%m-%d").to_string(),
            data_atual: now.format("%Y-%m-%d").to_string(),
            descricao_boleto: description.to_string(),
        }),
    )
}

/// Gateway contact profile injected as a plain message on a contact's first
/// thread; no `acao` wrapper.
pub fn contact_profile_message(name: &str, phone: &str) -> String {
    let data = InstructionData::ContactProfile {
        contact_name: name.to_string(),
        phone_number: phone.to_string(),
    };
    serde_json::to_string_pretty(&data).unwrap_or_else(|_| String::from("{}"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use chrono_tz::Tz;

    use super::{check_suggested_date, contact_profile_message, extract_chosen_datetime};

    fn wednesday() -> chrono::DateTime<Tz> {
        chrono_tz::UTC.with_ymd_and_hms(2025, 3, 5, 14, 0, 0).unwrap()
    }

    #[test]
    fn suggested_date_carries_today_tomorrow_and_parity() {
        let wire = check_suggested_date(wednesday()).to_wire();
        assert!(wire.contains(r#""acao": "verificar_data_sugerida""#));
        assert!(wire.contains(r#""hoje": "05/03/2025, Wednesday""#));
        assert!(wire.contains(r#""sugestao_inicial": "06/03/2025, Thursday""#));
        assert!(wire.contains(r#""numero_semana": "09""#));
        assert!(wire.contains(r#""semana_par_impar": "ÍMPAR""#));
    }

    #[test]
    fn chosen_datetime_blanks_the_suggestion_fields() {
        let wire = extract_chosen_datetime(wednesday()).to_wire();
        assert!(wire.contains(r#""acao": "extrair_data_hora_escolhida""#));
        assert!(wire.contains(r#""sugestao_inicial": """#));
        assert!(wire.contains(r#""numero_semana": """#));
    }

    #[test]
    fn contact_profile_is_bare_camel_case_json() {
        let message = contact_profile_message("Ana", "5511999990000");
        assert!(message.contains(r#""contactName": "Ana""#));
        assert!(!message.contains("acao"));
    }
}
