//! Payment reminder text sent to customers

use chrono::{Datelike, NaiveDate};

use super::tax::TaxBreakdown;

const MONTHS_ES: [&str; 12] = [
    "enero",
    "febrero",
    "marzo",
    "abril",
    "mayo",
    "junio",
    "julio",
    "agosto",
    "septiembre",
    "octubre",
    "noviembre",
    "diciembre",
];

/// What a reminder needs to know about the invoice and its recipient
#[derive(Debug, Clone)]
pub struct ReminderDetails<'a> {
    pub contact_name: Option<&'a str>,
    pub business_name: &'a str,
    pub invoice_number: &'a str,
    pub amounts: TaxBreakdown,
    pub due_date: NaiveDate,
}

/// `15 de marzo de 2025`
pub fn format_date_es(date: NaiveDate) -> String {
    format!(
        "{} de {} de {}",
        date.day(),
        MONTHS_ES[date.month0() as usize],
        date.year()
    )
}

/// Build the reminder text, stating the IVA-inclusive total
pub fn payment_reminder(details: &ReminderDetails<'_>, today: NaiveDate) -> String {
    let greeting = match details.contact_name.map(str::trim) {
        Some(name) if !name.is_empty() => format!("Hola {name}"),
        _ => format!("Hola equipo de {}", details.business_name),
    };

    let when = if details.due_date < today {
        format!("venció el {}", format_date_es(details.due_date))
    } else {
        format!("vence el {}", format_date_es(details.due_date))
    };

    format!(
        "{greeting}, te recordamos que la factura {number} por {total} MXN \
         (subtotal {subtotal} + IVA 16% {tax}) {when}. \
         Si ya realizaste el pago, por favor ignora este mensaje. ¡Gracias!",
        number = details.invoice_number,
        total = details.amounts.total,
        subtotal = details.amounts.subtotal,
        tax = details.amounts.tax,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::tax::{compute, Money};

    fn details(contact: Option<&'static str>) -> ReminderDetails<'static> {
        ReminderDetails {
            contact_name: contact,
            business_name: "Café Luna",
            invoice_number: "INV-202503-0007",
            amounts: compute(Money::from_pesos(4500.0)),
            due_date: NaiveDate::from_ymd_opt(2025, 3, 15).unwrap(),
        }
    }

    #[test]
    fn quotes_tax_inclusive_total() {
        let today = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let text = payment_reminder(&details(Some("Ana")), today);

        assert!(text.starts_with("Hola Ana,"));
        assert!(text.contains("INV-202503-0007"));
        assert!(text.contains("$5,220.00 MXN"));
        assert!(text.contains("subtotal $4,500.00 + IVA 16% $720.00"));
        assert!(text.contains("vence el 15 de marzo de 2025"));
    }

    #[test]
    fn overdue_and_missing_contact() {
        let today = NaiveDate::from_ymd_opt(2025, 4, 2).unwrap();
        let text = payment_reminder(&details(Some("  ")), today);

        assert!(text.starts_with("Hola equipo de Café Luna,"));
        assert!(text.contains("venció el 15 de marzo de 2025"));
    }
}
