/// Running total of bytes drawn from the system allocator, capped by a
/// ceiling fixed at init.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BudgetGuard {
  ceiling: usize,
  drawn: usize,
}

impl BudgetGuard {
  pub fn new(ceiling: usize) -> Self {
    Self { ceiling, drawn: 0 }
  }

  /// Whether `bytes` more still fit under the ceiling.
  pub fn admit(
    &self,
    bytes: usize,
  ) -> bool {
    bytes <= self.ceiling.saturating_sub(self.drawn)
  }

  /// Records `bytes` as drawn. Callers check [`admit`](Self::admit) first.
  pub fn charge(
    &mut self,
    bytes: usize,
  ) {
    debug_assert!(self.admit(bytes));
    self.drawn += bytes;
  }

  pub fn refund(
    &mut self,
    bytes: usize,
  ) {
    debug_assert!(bytes <= self.drawn);
    self.drawn -= bytes;
  }

  pub fn ceiling(&self) -> usize {
    self.ceiling
  }

  pub fn drawn(&self) -> usize {
    self.drawn
  }

  pub fn remaining(&self) -> usize {
    self.ceiling - self.drawn
  }
}
