pub mod saved;

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::backend::BackendError;
use crate::docid::{DocIdGenerator, DocType};
use crate::records::Client;
use crate::settings::{BankDetails, TaxRates};
use crate::store::types::SiteContent;

#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    #[error("Item description cannot be empty.")]
    EmptyDescription,
    #[error("Quantity must be greater than zero.")]
    InvalidQuantity,
    #[error("Price cannot be negative.")]
    InvalidPrice,
    #[error("No line item #{0}.")]
    NoSuchItem(u32),
    #[error("Add at least one line item before saving.")]
    EmptyDraft,
    #[error("Saved record has no document payload.")]
    MissingPayload,
    #[error("Backend error: {0}")]
    Remote(#[from] BackendError),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BillTo {
    pub name: String,
    pub company: String,
    pub address: String,
    pub email: String,
    pub phone: String,
}

impl From<&Client> for BillTo {
    fn from(client: &Client) -> Self {
        Self {
            name: client.name.clone(),
            company: String::new(),
            address: client.address.clone(),
            email: client.email.clone(),
            phone: client.phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    /// Row number within the draft; stable across removals.
    pub row: u32,
    pub description: String,
    pub hsn_code: Option<String>,
    pub unit: String,
    pub price: f64,
    pub qty: f64,
}

impl LineItem {
    pub fn total(&self) -> f64 {
        self.price * self.qty
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub subtotal: f64,
    pub cgst: f64,
    pub sgst: f64,
    pub grand_total: f64,
}

/// A quotation or invoice being assembled. Not persisted until saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotationDraft {
    pub doc_type: DocType,
    pub doc_id: String,
    pub date: NaiveDate,
    pub bill_to: BillTo,
    pub items: Vec<LineItem>,
    #[serde(default)]
    pub technicals: Vec<String>,
    #[serde(default)]
    pub terms: Vec<String>,
    #[serde(default)]
    next_row: u32,
}

impl QuotationDraft {
    pub fn new(doc_type: DocType, ids: &DocIdGenerator) -> Self {
        let date = Local::now().date_naive();
        Self {
            doc_type,
            doc_id: ids.generate_for(doc_type, date),
            date,
            bill_to: BillTo::default(),
            items: Vec::new(),
            technicals: Vec::new(),
            terms: Vec::new(),
            next_row: 1,
        }
    }

    /// Changing the type issues a fresh identifier with the new code.
    pub fn set_doc_type(&mut self, doc_type: DocType, ids: &DocIdGenerator) {
        if self.doc_type != doc_type {
            self.doc_type = doc_type;
            self.doc_id = ids.generate_for(doc_type, self.date);
        }
    }

    pub fn add_item(
        &mut self,
        description: &str,
        hsn_code: Option<&str>,
        unit: Option<&str>,
        price: f64,
        qty: f64,
    ) -> Result<u32, QuoteError> {
        if description.trim().is_empty() {
            return Err(QuoteError::EmptyDescription);
        }
        if !qty.is_finite() || qty <= 0.0 {
            return Err(QuoteError::InvalidQuantity);
        }
        if !price.is_finite() || price < 0.0 {
            return Err(QuoteError::InvalidPrice);
        }

        let row = self.next_row.max(self.items.iter().map(|i| i.row).max().unwrap_or(0) + 1);
        self.next_row = row + 1;
        self.items.push(LineItem {
            row,
            description: description.trim().to_string(),
            hsn_code: hsn_code
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            unit: unit
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .unwrap_or("Nos")
                .to_string(),
            price,
            qty,
        });
        Ok(row)
    }

    pub fn remove_item(&mut self, row: u32) -> Result<LineItem, QuoteError> {
        let pos = self
            .items
            .iter()
            .position(|i| i.row == row)
            .ok_or(QuoteError::NoSuchItem(row))?;
        Ok(self.items.remove(pos))
    }

    pub fn subtotal(&self) -> f64 {
        self.items.iter().map(LineItem::total).sum()
    }

    pub fn totals(&self, rates: TaxRates) -> Totals {
        let subtotal = self.subtotal();
        let cgst = subtotal * rates.cgst / 100.0;
        let sgst = subtotal * rates.sgst / 100.0;
        Totals {
            subtotal,
            cgst,
            sgst,
            grand_total: subtotal + cgst + sgst,
        }
    }

    /// Printable preview of the document.
    pub fn render_markdown(
        &self,
        site: &SiteContent,
        rates: TaxRates,
        bank: Option<&BankDetails>,
        payment_terms: Option<&str>,
    ) -> String {
        let g = &site.global;
        let mut out = format!(
            "**{}**\n{} | {} | {}\n\n**{}** `{}`\nDate: {}\n\n",
            g.site_name,
            g.address,
            g.contact_phone,
            g.contact_email,
            self.doc_type.label().to_uppercase(),
            self.doc_id,
            self.date.format("%d %b %Y")
        );

        out.push_str("**Bill To**\n");
        let b = &self.bill_to;
        out.push_str(if b.name.is_empty() { "Client Name" } else { b.name.as_str() });
        out.push('\n');
        for line in [&b.company, &b.address, &b.email, &b.phone] {
            if !line.is_empty() {
                out.push_str(line);
                out.push('\n');
            }
        }
        out.push('\n');

        if self.items.is_empty() {
            out.push_str("_No items added yet._\n");
        } else {
            out.push_str("```\n");
            out.push_str(&format!(
                "{:<3} {:<34} {:>8} {:>10} {:>14} {:>14}\n",
                "#", "Description", "HSN/SAC", "Qty", "Rate", "Amount"
            ));
            for item in &self.items {
                out.push_str(&format!(
                    "{:<3} {:<34} {:>8} {:>10} {:>14} {:>14}\n",
                    item.row,
                    truncate(&item.description, 34),
                    item.hsn_code.as_deref().unwrap_or("-"),
                    format!("{} {}", item.qty, item.unit),
                    format_inr(item.price),
                    format_inr(item.total())
                ));
            }
            out.push_str("```\n");
        }

        let t = self.totals(rates);
        out.push_str(&format!(
            "Subtotal: {}\nCGST ({}%): {}\nSGST ({}%): {}\n**Total: {}**\n",
            format_inr(t.subtotal),
            rates.cgst,
            format_inr(t.cgst),
            rates.sgst,
            format_inr(t.sgst),
            format_inr(t.grand_total)
        ));

        if !self.technicals.is_empty() {
            out.push_str("\n**Technicals**\n");
            for (i, text) in self.technicals.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", i + 1, text));
            }
        }
        if !self.terms.is_empty() || payment_terms.is_some() {
            out.push_str("\n**Terms & Conditions**\n");
            let mut n = 0;
            if let Some(payment) = payment_terms {
                n += 1;
                out.push_str(&format!("{}. Payment: {}\n", n, payment));
            }
            for text in &self.terms {
                n += 1;
                out.push_str(&format!("{}. {}\n", n, text));
            }
        }
        if let Some(bank) = bank {
            out.push_str(&format!(
                "\n**Bank Details**\n{} | A/c {} | IFSC {}\n",
                bank.bank_name, bank.account_number, bank.ifsc
            ));
        }

        out.push_str(&format!("\n{}\nThank you for your business!\n", g.footer_about));
        out
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let mut s: String = text.chars().take(max - 1).collect();
        s.push('…');
        s
    }
}

/// Rupee amount with Indian digit grouping, e.g. `₹1,23,456.50`.
pub fn format_inr(amount: f64) -> String {
    let sign = if amount < 0.0 { "-" } else { "" };
    let paise = (amount.abs() * 100.0).round() as u64;
    let digits = (paise / 100).to_string();

    let grouped = if digits.len() <= 3 {
        digits
    } else {
        let (head, tail) = digits.split_at(digits.len() - 3);
        let mut groups = Vec::new();
        let mut rest = head;
        while rest.len() > 2 {
            let (a, b) = rest.split_at(rest.len() - 2);
            groups.push(b);
            rest = a;
        }
        if !rest.is_empty() {
            groups.push(rest);
        }
        groups.reverse();
        format!("{},{}", groups.join(","), tail)
    };
    format!("{}₹{}.{:02}", sign, grouped, paise % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::docid::SequenceSource;

    struct Fixed;

    impl SequenceSource for Fixed {
        fn next(&self) -> u32 {
            42
        }
    }

    fn draft() -> QuotationDraft {
        let ids = DocIdGenerator::new(Box::new(Fixed));
        let mut d = QuotationDraft::new(DocType::Quotation, &ids);
        d.date = NaiveDate::from_ymd_opt(2026, 3, 9).unwrap();
        d
    }

    const RATES: TaxRates = TaxRates { cgst: 9.0, sgst: 9.0 };

    #[test]
    fn test_format_inr() {
        assert_eq!(format_inr(0.0), "₹0.00");
        assert_eq!(format_inr(999.5), "₹999.50");
        assert_eq!(format_inr(123456.5), "₹1,23,456.50");
        assert_eq!(format_inr(1234567.0), "₹12,34,567.00");
        assert_eq!(format_inr(-1500.0), "-₹1,500.00");
    }

    #[test]
    fn test_items_and_totals() {
        let mut d = draft();
        d.add_item("Core cutting", Some("998346"), None, 1500.0, 4.0).unwrap();
        let second = d.add_item("Site visit", None, Some("Visit"), 2000.0, 1.0).unwrap();
        assert_eq!(second, 2);
        assert_eq!(d.items[0].unit, "Nos");

        let t = d.totals(RATES);
        assert_eq!(t.subtotal, 8000.0);
        assert_eq!(t.cgst, 720.0);
        assert_eq!(t.sgst, 720.0);
        assert_eq!(t.grand_total, 9440.0);

        let removed = d.remove_item(1).unwrap();
        assert_eq!(removed.description, "Core cutting");
        assert_eq!(d.subtotal(), 2000.0);
        assert!(matches!(d.remove_item(1), Err(QuoteError::NoSuchItem(1))));
        // Row numbers are never reused.
        assert_eq!(d.add_item("Report", None, None, 500.0, 1.0).unwrap(), 3);
    }

    #[test]
    fn test_item_validation() {
        let mut d = draft();
        assert!(matches!(
            d.add_item("  ", None, None, 1.0, 1.0),
            Err(QuoteError::EmptyDescription)
        ));
        assert!(matches!(
            d.add_item("x", None, None, 1.0, 0.0),
            Err(QuoteError::InvalidQuantity)
        ));
        assert!(matches!(
            d.add_item("x", None, None, -1.0, 1.0),
            Err(QuoteError::InvalidPrice)
        ));
        assert!(matches!(
            d.add_item("x", None, None, f64::NAN, 1.0),
            Err(QuoteError::InvalidPrice)
        ));
        assert!(d.items.is_empty());
    }

    #[test]
    fn test_set_doc_type_regenerates_id() {
        let ids = DocIdGenerator::new(Box::new(Fixed));
        let mut d = draft();
        assert!(d.doc_id.ends_with("/QN/042"));
        d.set_doc_type(DocType::Quotation, &ids);
        assert!(d.doc_id.ends_with("/QN/042"));
        d.set_doc_type(DocType::TaxInvoice, &ids);
        assert_eq!(d.doc_id, "EESIPL/2026/03/TI/042");
    }

    #[test]
    fn test_bill_to_from_client() {
        let client = Client::new("Indus Towers Ltd.", "Bengaluru", "ap@indus.in", "080-1");
        let bill: BillTo = (&client).into();
        assert_eq!(bill.name, "Indus Towers Ltd.");
        assert_eq!(bill.address, "Bengaluru");
    }

    #[test]
    fn test_render_markdown() {
        let mut d = draft();
        d.bill_to.name = "Indus Towers Ltd.".into();
        d.add_item("Rebound hammer test", Some("998346"), Some("Test"), 1200.0, 2.0)
            .unwrap();
        d.technicals.push("Tests as per IS 13311".into());
        d.terms.push("Validity 30 days".into());
        let bank = BankDetails {
            bank_name: "Canara Bank".into(),
            account_number: "0412".into(),
            ifsc: "CNRB0000412".into(),
        };

        let text = d.render_markdown(&SiteContent::default(), RATES, Some(&bank), Some("100% advance"));
        assert!(text.contains("**QUOTATION**"));
        assert!(text.contains("Indus Towers Ltd."));
        assert!(text.contains("Rebound hammer test"));
        assert!(text.contains("**Total: ₹2,832.00**"));
        assert!(text.contains("1. Tests as per IS 13311"));
        assert!(text.contains("1. Payment: 100% advance\n2. Validity 30 days"));
        assert!(text.contains("IFSC CNRB0000412"));
    }

    #[test]
    fn test_render_empty_draft() {
        let text = draft().render_markdown(&SiteContent::default(), RATES, None, None);
        assert!(text.contains("No items added yet."));
        assert!(text.contains("Client Name"));
        assert!(!text.contains("Bank Details"));
    }
}
