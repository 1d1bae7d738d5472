//! Two-level, reversible invoice approval.
//!
//! Flags are stored on every line item of an invoice but transitions are
//! decided once per invoice: `InvoiceApproval` is rebuilt from the sibling lines,
//! decides which audit events a command produces, and the storage layer then
//! stamps every line in a single write.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use portbill_core::{Aggregate, AggregateRoot, ApprovalLevel, DomainError, DomainResult, UserId};
use portbill_events::Event;

use crate::line_item::{InvoiceNumber, ServiceLineItem};

/// Approval state of an invoice (and of each of its lines).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    #[default]
    Draft,
    Level1Validated,
    Level2Validated,
}

/// What invalidating level 1 does while level 2 is still set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level1InvalidationPolicy {
    /// Clear level 2 as well.
    #[default]
    Cascade,
    /// Refuse; level 2 has to be invalidated first.
    Strict,
}

impl ValidationState {
    /// Rebuild a state from the two stored booleans.
    pub fn from_flags(valide1: bool, valide2: bool) -> DomainResult<Self> {
        match (valide1, valide2) {
            (false, false) => Ok(Self::Draft),
            (true, false) => Ok(Self::Level1Validated),
            (true, true) => Ok(Self::Level2Validated),
            (false, true) => Err(DomainError::invariant(
                "level 2 validation recorded without level 1",
            )),
        }
    }

    pub fn valide1(self) -> bool {
        self != Self::Draft
    }

    pub fn valide2(self) -> bool {
        self == Self::Level2Validated
    }

    /// Highest level currently set, if any.
    pub fn blocking_level(self) -> Option<ApprovalLevel> {
        match self {
            Self::Draft => None,
            Self::Level1Validated => Some(ApprovalLevel::Level1),
            Self::Level2Validated => Some(ApprovalLevel::Level2),
        }
    }

    pub fn validate_level1(self) -> DomainResult<Self> {
        match self {
            Self::Draft => Ok(Self::Level1Validated),
            _ => Err(DomainError::conflict("invoice is already validated at level 1")),
        }
    }

    pub fn invalidate_level1(self, policy: Level1InvalidationPolicy) -> DomainResult<Self> {
        match (self, policy) {
            (Self::Draft, _) => Err(DomainError::precondition(
                "invoice is not validated at level 1",
            )),
            (Self::Level1Validated, _) => Ok(Self::Draft),
            (Self::Level2Validated, Level1InvalidationPolicy::Cascade) => Ok(Self::Draft),
            (Self::Level2Validated, Level1InvalidationPolicy::Strict) => Err(
                DomainError::precondition("level 2 validation must be invalidated before level 1"),
            ),
        }
    }

    pub fn validate_level2(self) -> DomainResult<Self> {
        match self {
            Self::Draft => Err(DomainError::precondition(
                "invoice must be validated at level 1 before level 2",
            )),
            Self::Level1Validated => Ok(Self::Level2Validated),
            Self::Level2Validated => Err(DomainError::conflict(
                "invoice is already validated at level 2",
            )),
        }
    }

    pub fn invalidate_level2(self) -> DomainResult<Self> {
        match self {
            Self::Level2Validated => Ok(Self::Level1Validated),
            _ => Err(DomainError::precondition("invoice is not validated at level 2")),
        }
    }
}

/// Approval stamp carried by each line item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    state: ValidationState,
    level1_by: Option<UserId>,
    level2_by: Option<UserId>,
}

impl Approval {
    pub fn draft() -> Self {
        Self::default()
    }

    pub fn state(&self) -> ValidationState {
        self.state
    }

    pub fn level1_by(&self) -> Option<UserId> {
        self.level1_by
    }

    pub fn level2_by(&self) -> Option<UserId> {
        self.level2_by
    }

    pub fn validate_level1(self, validator: UserId) -> DomainResult<Self> {
        Ok(Self {
            state: self.state.validate_level1()?,
            level1_by: Some(validator),
            level2_by: None,
        })
    }

    /// Storage-side level-1 invalidation always clears both levels.
    pub fn invalidate_level1(self) -> DomainResult<Self> {
        self.state.invalidate_level1(Level1InvalidationPolicy::Cascade)?;
        Ok(Self::draft())
    }

    pub fn validate_level2(self, validator: UserId) -> DomainResult<Self> {
        Ok(Self {
            state: self.state.validate_level2()?,
            level1_by: self.level1_by,
            level2_by: Some(validator),
        })
    }

    pub fn invalidate_level2(self) -> DomainResult<Self> {
        Ok(Self {
            state: self.state.invalidate_level2()?,
            level1_by: self.level1_by,
            level2_by: None,
        })
    }
}

/// Invoice-scoped approval aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceApproval {
    invoice_number: InvoiceNumber,
    approval: Approval,
    line_count: usize,
    policy: Level1InvalidationPolicy,
}

impl InvoiceApproval {
    /// Rebuild the invoice state from all of its line items.
    ///
    /// Every line must belong to `invoice_number` and carry the same state.
    pub fn from_lines(
        invoice_number: &InvoiceNumber,
        lines: &[ServiceLineItem],
        policy: Level1InvalidationPolicy,
    ) -> DomainResult<Self> {
        let first = lines
            .first()
            .ok_or_else(|| DomainError::not_found(format!("invoice {invoice_number}")))?;

        for line in lines {
            if line.invoice_number() != Some(invoice_number) {
                return Err(DomainError::invariant(format!(
                    "{} does not belong to invoice {invoice_number}",
                    line.label()
                )));
            }
            if line.approval().state() != first.approval().state() {
                return Err(DomainError::invariant(format!(
                    "invoice {invoice_number} has lines in different validation states"
                )));
            }
        }

        Ok(Self {
            invoice_number: invoice_number.clone(),
            approval: *first.approval(),
            line_count: lines.len(),
            policy,
        })
    }

    pub fn state(&self) -> ValidationState {
        self.approval.state()
    }

    pub fn approval(&self) -> &Approval {
        &self.approval
    }

    pub fn line_count(&self) -> usize {
        self.line_count
    }

    pub fn policy(&self) -> Level1InvalidationPolicy {
        self.policy
    }

    fn ensure_invoice(&self, invoice_number: &InvoiceNumber) -> DomainResult<()> {
        if &self.invoice_number != invoice_number {
            return Err(DomainError::invariant("invoice_number mismatch"));
        }
        Ok(())
    }
}

impl AggregateRoot for InvoiceApproval {
    type Id = InvoiceNumber;

    fn id(&self) -> &Self::Id {
        &self.invoice_number
    }
}

/// Command: ValidateLevel1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateLevel1 {
    pub invoice_number: InvoiceNumber,
    pub validator: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: InvalidateLevel1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateLevel1 {
    pub invoice_number: InvoiceNumber,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ValidateLevel2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidateLevel2 {
    pub invoice_number: InvoiceNumber,
    pub validator: UserId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: InvalidateLevel2.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidateLevel2 {
    pub invoice_number: InvoiceNumber,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalCommand {
    ValidateLevel1(ValidateLevel1),
    InvalidateLevel1(InvalidateLevel1),
    ValidateLevel2(ValidateLevel2),
    InvalidateLevel2(InvalidateLevel2),
}

/// Event: Level1Validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level1Validated {
    pub invoice_number: InvoiceNumber,
    pub validator: UserId,
    pub line_count: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Level1Invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level1Invalidated {
    pub invoice_number: InvoiceNumber,
    pub line_count: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Level2Validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2Validated {
    pub invoice_number: InvoiceNumber,
    pub validator: UserId,
    pub line_count: usize,
    pub occurred_at: DateTime<Utc>,
}

/// Event: Level2Invalidated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level2Invalidated {
    pub invoice_number: InvoiceNumber,
    pub line_count: usize,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ApprovalEvent {
    Level1Validated(Level1Validated),
    Level1Invalidated(Level1Invalidated),
    Level2Validated(Level2Validated),
    Level2Invalidated(Level2Invalidated),
}

impl ApprovalEvent {
    pub fn invoice_number(&self) -> &InvoiceNumber {
        match self {
            ApprovalEvent::Level1Validated(e) => &e.invoice_number,
            ApprovalEvent::Level1Invalidated(e) => &e.invoice_number,
            ApprovalEvent::Level2Validated(e) => &e.invoice_number,
            ApprovalEvent::Level2Invalidated(e) => &e.invoice_number,
        }
    }
}

impl Event for ApprovalEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ApprovalEvent::Level1Validated(_) => "invoicing.approval.level1_validated",
            ApprovalEvent::Level1Invalidated(_) => "invoicing.approval.level1_invalidated",
            ApprovalEvent::Level2Validated(_) => "invoicing.approval.level2_validated",
            ApprovalEvent::Level2Invalidated(_) => "invoicing.approval.level2_invalidated",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ApprovalEvent::Level1Validated(e) => e.occurred_at,
            ApprovalEvent::Level1Invalidated(e) => e.occurred_at,
            ApprovalEvent::Level2Validated(e) => e.occurred_at,
            ApprovalEvent::Level2Invalidated(e) => e.occurred_at,
        }
    }
}

impl Aggregate for InvoiceApproval {
    type Command = ApprovalCommand;
    type Event = ApprovalEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let state = self.approval.state;
        self.approval = match event {
            ApprovalEvent::Level1Validated(e) => Approval {
                state: ValidationState::Level1Validated,
                level1_by: Some(e.validator),
                level2_by: None,
            },
            ApprovalEvent::Level1Invalidated(_) => Approval::draft(),
            ApprovalEvent::Level2Validated(e) => Approval {
                state: ValidationState::Level2Validated,
                level1_by: self.approval.level1_by,
                level2_by: Some(e.validator),
            },
            ApprovalEvent::Level2Invalidated(_) => Approval {
                state: if state.valide1() {
                    ValidationState::Level1Validated
                } else {
                    ValidationState::Draft
                },
                level1_by: self.approval.level1_by,
                level2_by: None,
            },
        };
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ApprovalCommand::ValidateLevel1(cmd) => self.handle_validate_level1(cmd),
            ApprovalCommand::InvalidateLevel1(cmd) => self.handle_invalidate_level1(cmd),
            ApprovalCommand::ValidateLevel2(cmd) => self.handle_validate_level2(cmd),
            ApprovalCommand::InvalidateLevel2(cmd) => self.handle_invalidate_level2(cmd),
        }
    }
}

impl InvoiceApproval {
    fn handle_validate_level1(&self, cmd: &ValidateLevel1) -> DomainResult<Vec<ApprovalEvent>> {
        self.ensure_invoice(&cmd.invoice_number)?;
        self.state().validate_level1()?;

        Ok(vec![ApprovalEvent::Level1Validated(Level1Validated {
            invoice_number: cmd.invoice_number.clone(),
            validator: cmd.validator,
            line_count: self.line_count,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_invalidate_level1(&self, cmd: &InvalidateLevel1) -> DomainResult<Vec<ApprovalEvent>> {
        self.ensure_invoice(&cmd.invoice_number)?;
        self.state().invalidate_level1(self.policy)?;

        let mut events = Vec::with_capacity(2);
        if self.state().valide2() {
            events.push(ApprovalEvent::Level2Invalidated(Level2Invalidated {
                invoice_number: cmd.invoice_number.clone(),
                line_count: self.line_count,
                occurred_at: cmd.occurred_at,
            }));
        }
        events.push(ApprovalEvent::Level1Invalidated(Level1Invalidated {
            invoice_number: cmd.invoice_number.clone(),
            line_count: self.line_count,
            occurred_at: cmd.occurred_at,
        }));
        Ok(events)
    }

    fn handle_validate_level2(&self, cmd: &ValidateLevel2) -> DomainResult<Vec<ApprovalEvent>> {
        self.ensure_invoice(&cmd.invoice_number)?;
        self.state().validate_level2()?;

        Ok(vec![ApprovalEvent::Level2Validated(Level2Validated {
            invoice_number: cmd.invoice_number.clone(),
            validator: cmd.validator,
            line_count: self.line_count,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_invalidate_level2(&self, cmd: &InvalidateLevel2) -> DomainResult<Vec<ApprovalEvent>> {
        self.ensure_invoice(&cmd.invoice_number)?;
        self.state().invalidate_level2()?;

        Ok(vec![ApprovalEvent::Level2Invalidated(Level2Invalidated {
            invoice_number: cmd.invoice_number.clone(),
            line_count: self.line_count,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portbill_catalog::{PricingMode, ServiceDefinition};
    use portbill_core::{LineItemId, ServiceId};

    use crate::line_item::{BillingInputs, ShipmentCode};

    fn invoice() -> InvoiceNumber {
        InvoiceNumber::new("FAC-000001").unwrap()
    }

    fn persisted_line(name: &str, approval: Approval) -> ServiceLineItem {
        let service =
            ServiceDefinition::new(ServiceId::new(), name, name, PricingMode::Flat, 1000).unwrap();
        let mut line = ServiceLineItem::draft(
            ShipmentCode::new("LT-001").unwrap(),
            service,
            BillingInputs::new(1),
        );
        line.assign_identity(LineItemId::new(), invoice());
        line.set_approval(approval);
        line
    }

    fn approval_at(state: ValidationState) -> InvoiceApproval {
        let mut approval = Approval::draft();
        if state.valide1() {
            approval = approval.validate_level1(UserId::new()).unwrap();
        }
        if state.valide2() {
            approval = approval.validate_level2(UserId::new()).unwrap();
        }
        let lines = vec![persisted_line("A", approval), persisted_line("B", approval)];
        InvoiceApproval::from_lines(&invoice(), &lines, Level1InvalidationPolicy::Cascade).unwrap()
    }

    fn validate_level1(validator: UserId) -> ApprovalCommand {
        ApprovalCommand::ValidateLevel1(ValidateLevel1 {
            invoice_number: invoice(),
            validator,
            occurred_at: Utc::now(),
        })
    }

    fn validate_level2(validator: UserId) -> ApprovalCommand {
        ApprovalCommand::ValidateLevel2(ValidateLevel2 {
            invoice_number: invoice(),
            validator,
            occurred_at: Utc::now(),
        })
    }

    fn invalidate_level1() -> ApprovalCommand {
        ApprovalCommand::InvalidateLevel1(InvalidateLevel1 {
            invoice_number: invoice(),
            occurred_at: Utc::now(),
        })
    }

    fn invalidate_level2() -> ApprovalCommand {
        ApprovalCommand::InvalidateLevel2(InvalidateLevel2 {
            invoice_number: invoice(),
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn from_flags_rejects_level2_without_level1() {
        assert!(matches!(
            ValidationState::from_flags(false, true),
            Err(DomainError::InvariantViolation(_))
        ));
        assert_eq!(
            ValidationState::from_flags(true, true).unwrap(),
            ValidationState::Level2Validated
        );
    }

    #[test]
    fn validate_level1_records_validator_and_line_count() {
        let mut approval = approval_at(ValidationState::Draft);
        let validator = UserId::new();

        let events = approval.handle(&validate_level1(validator)).unwrap();
        assert_eq!(events.len(), 1);
        match &events[0] {
            ApprovalEvent::Level1Validated(e) => {
                assert_eq!(e.validator, validator);
                assert_eq!(e.line_count, 2);
                assert_eq!(e.invoice_number, invoice());
            }
            _ => panic!("Expected Level1Validated event"),
        }

        approval.apply(&events[0]);
        assert_eq!(approval.state(), ValidationState::Level1Validated);
        assert_eq!(approval.approval().level1_by(), Some(validator));
    }

    #[test]
    fn validate_level1_twice_is_a_conflict() {
        let approval = approval_at(ValidationState::Level1Validated);
        let err = approval.handle(&validate_level1(UserId::new())).unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }

    #[test]
    fn validate_level2_requires_level1() {
        let approval = approval_at(ValidationState::Draft);
        let err = approval.handle(&validate_level2(UserId::new())).unwrap_err();
        match err {
            DomainError::Precondition(msg) => assert!(msg.contains("level 1")),
            _ => panic!("Expected Precondition error for level 2 before level 1"),
        }
    }

    #[test]
    fn full_forward_and_backward_cycle() {
        let mut approval = approval_at(ValidationState::Draft);
        for command in [
            validate_level1(UserId::new()),
            validate_level2(UserId::new()),
            invalidate_level2(),
            invalidate_level1(),
        ] {
            let events = approval.handle(&command).unwrap();
            for event in &events {
                approval.apply(event);
            }
        }
        assert_eq!(approval.state(), ValidationState::Draft);
        assert_eq!(approval.approval(), &Approval::draft());
    }

    #[test]
    fn cascade_invalidation_clears_both_levels() {
        let mut approval = approval_at(ValidationState::Level2Validated);
        let events = approval.handle(&invalidate_level1()).unwrap();

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], ApprovalEvent::Level2Invalidated(_)));
        assert!(matches!(events[1], ApprovalEvent::Level1Invalidated(_)));

        for event in &events {
            approval.apply(event);
        }
        assert_eq!(approval.state(), ValidationState::Draft);
    }

    #[test]
    fn strict_invalidation_requires_level2_cleared_first() {
        let approval = approval_at(ValidationState::Level2Validated);
        let lines = vec![persisted_line("A", *approval.approval())];
        let strict =
            InvoiceApproval::from_lines(&invoice(), &lines, Level1InvalidationPolicy::Strict)
                .unwrap();

        let err = strict.handle(&invalidate_level1()).unwrap_err();
        assert!(matches!(err, DomainError::Precondition(_)));
    }

    #[test]
    fn invalidating_unset_levels_is_rejected() {
        let draft = approval_at(ValidationState::Draft);
        assert!(matches!(
            draft.handle(&invalidate_level1()),
            Err(DomainError::Precondition(_))
        ));
        let level1 = approval_at(ValidationState::Level1Validated);
        assert!(matches!(
            level1.handle(&invalidate_level2()),
            Err(DomainError::Precondition(_))
        ));
    }

    #[test]
    fn from_lines_rejects_mixed_states() {
        let validated = Approval::draft().validate_level1(UserId::new()).unwrap();
        let lines = vec![
            persisted_line("A", Approval::draft()),
            persisted_line("B", validated),
        ];
        let err = InvoiceApproval::from_lines(&invoice(), &lines, Level1InvalidationPolicy::Cascade)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    #[test]
    fn from_lines_rejects_empty_invoice() {
        let err = InvoiceApproval::from_lines(&invoice(), &[], Level1InvalidationPolicy::Cascade)
            .unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[test]
    fn command_for_other_invoice_is_rejected() {
        let approval = approval_at(ValidationState::Draft);
        let cmd = ApprovalCommand::ValidateLevel1(ValidateLevel1 {
            invoice_number: InvoiceNumber::new("FAC-999999").unwrap(),
            validator: UserId::new(),
            occurred_at: Utc::now(),
        });
        assert!(matches!(
            approval.handle(&cmd),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        fn any_command() -> impl Strategy<Value = u8> {
            0u8..4
        }

        proptest! {
            /// Property: level 2 is never reached without level 1, whatever the command sequence.
            #[test]
            fn level2_implies_level1(commands in proptest::collection::vec(any_command(), 0..30), strict in any::<bool>()) {
                let policy = if strict { Level1InvalidationPolicy::Strict } else { Level1InvalidationPolicy::Cascade };
                let lines = vec![persisted_line("A", Approval::draft())];
                let mut approval = InvoiceApproval::from_lines(&invoice(), &lines, policy).unwrap();

                for c in commands {
                    let command = match c {
                        0 => validate_level1(UserId::new()),
                        1 => invalidate_level1(),
                        2 => validate_level2(UserId::new()),
                        _ => invalidate_level2(),
                    };
                    if let Ok(events) = approval.handle(&command) {
                        for event in &events {
                            approval.apply(event);
                        }
                    }
                    let state = approval.state();
                    prop_assert!(!state.valide2() || state.valide1());
                    prop_assert_eq!(approval.approval().level2_by().is_some(), state.valide2());
                    prop_assert_eq!(approval.approval().level1_by().is_some(), state.valide1());
                }
            }
        }
    }
}
