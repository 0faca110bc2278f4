use arcis::*;

#[encrypted]
mod circuits {
    use arcis::*;

    /// Encrypted equality of the two stored operands, sealed back to the owner of `lhs`.
    #[instruction]
    pub fn compare_values(lhs_ctxt: Enc<Shared, u64>, rhs_ctxt: Enc<Shared, u64>) -> Enc<Shared, bool> {
        let lhs = lhs_ctxt.to_arcis();
        let rhs = rhs_ctxt.to_arcis();
        lhs_ctxt.owner.from_arcis(lhs == rhs)
    }

    /// Same comparison after XOR-mixing both operands with one oracle entropy value.
    /// Mixing with a shared mask keeps the equality relation: (a ^ e) == (b ^ e) iff a == b.
    #[instruction]
    pub fn compare_with_entropy(
        lhs_ctxt: Enc<Shared, u64>,
        rhs_ctxt: Enc<Shared, u64>,
        entropy_ctxt: Enc<Shared, u64>,
    ) -> Enc<Shared, bool> {
        let entropy = entropy_ctxt.to_arcis();
        let mixed_lhs = lhs_ctxt.to_arcis() ^ entropy;
        let mixed_rhs = rhs_ctxt.to_arcis() ^ entropy;
        lhs_ctxt.owner.from_arcis(mixed_lhs == mixed_rhs)
    }
}
