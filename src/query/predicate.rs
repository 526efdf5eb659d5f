//! Structured predicates: filters answered by ordinary document columns
//! instead of the full-text index.
//!
//! Every predicate renders to one SQL condition over the `documents` table
//! (aliased `d`) with at most one bound parameter. Values are always bound,
//! never spliced into the SQL text.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOp {
    /// `event_date < date`
    Before,
    /// `event_date >= date`
    OnOrAfter,
}

impl DateOp {
    pub fn flipped(self) -> DateOp {
        match self {
            DateOp::Before => DateOp::OnOrAfter,
            DateOp::OnOrAfter => DateOp::Before,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Exact match on the normalized sender address.
    SenderEmail { email: String, negated: bool },
    /// Membership in the delimiter-wrapped recipient list.
    RecipientEmail { email: String, negated: bool },
    /// Case-insensitive substring of the labels column.
    Label { text: String, negated: bool },
    /// Range bound on `event_date` (`YYYY-MM-DD`, compared as ISO text).
    EventDate { op: DateOp, date: String },
    HasAttachments(bool),
}

impl Predicate {
    /// SQL condition for this predicate.
    pub fn sql(&self) -> &'static str {
        match self {
            Predicate::SenderEmail { negated: false, .. } => "d.sender_email = ?",
            Predicate::SenderEmail { negated: true, .. } => "d.sender_email IS NOT ?",
            Predicate::RecipientEmail { negated: false, .. } => {
                "instr(d.recipient_emails, ?) > 0"
            }
            Predicate::RecipientEmail { negated: true, .. } => {
                "(d.recipient_emails IS NULL OR instr(d.recipient_emails, ?) = 0)"
            }
            Predicate::Label { negated: false, .. } => "instr(lower(d.labels), ?) > 0",
            Predicate::Label { negated: true, .. } => {
                "(d.labels IS NULL OR instr(lower(d.labels), ?) = 0)"
            }
            Predicate::EventDate {
                op: DateOp::Before,
                ..
            } => "d.event_date < ?",
            Predicate::EventDate {
                op: DateOp::OnOrAfter,
                ..
            } => "d.event_date >= ?",
            Predicate::HasAttachments(true) => "d.has_attachments = 1",
            Predicate::HasAttachments(false) => "d.has_attachments = 0",
        }
    }

    /// The value bound to the condition's placeholder, if it has one.
    pub fn param(&self) -> Option<String> {
        match self {
            Predicate::SenderEmail { email, .. } => Some(email.clone()),
            // Wrap in delimiters so `bob@x.com` cannot match `rebob@x.com`.
            Predicate::RecipientEmail { email, .. } => Some(format!(",{},", email)),
            // SQLite's lower() only folds ASCII; fold the same way here.
            Predicate::Label { text, .. } => Some(text.to_ascii_lowercase()),
            Predicate::EventDate { date, .. } => Some(date.clone()),
            Predicate::HasAttachments(_) => None,
        }
    }
}
