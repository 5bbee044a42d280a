//! Lowering of pattern syntax trees to Cranelift IR.
//!
//! Every node is generated against a pair of continuation blocks: a
//! success block and a failure block. Consuming nodes advance the shared
//! `index` variable themselves; zero-width nodes only branch. The
//! continuations are fixed before recursing into a child, and every
//! block ends in exactly one terminator.
//!
//! The function prologue picks one of five search plans from the tree
//! analyses; all plans funnel into the same two terminal blocks, which
//! write the match bounds to the out-parameters and return 1 or 0.

use cranelift_codegen::entity::EntityRef;
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::types::{I32, I64, I8};
use cranelift_codegen::ir::{AbiParam, Block, InstBuilder, MemFlags, SigRef, Signature, Value};
use cranelift_codegen::isa::CallConv;
use cranelift_frontend::{FunctionBuilder, Variable};
use tracing::debug;

use regforge_core::ast::{AnchorKind, ClassRange, Node};

use crate::runtime;

/// Trace tag for the run-length fast path.
const TRACE_RUN_LENGTH: u32 = 1;

/// Search plan selected from the tree analyses, in priority order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Plan {
    /// Anchored pattern: one attempt at offset zero.
    SingleAttempt,
    /// Pure literal: one substring-search call decides the match.
    Bmh(Vec<u8>),
    /// Known first byte: skip between candidate offsets with memchr.
    Memchr(u8),
    /// Some byte must occur in any match: attempt every offset up to
    /// each occurrence of that byte.
    MemchrRange(u8),
    /// Try every offset, including end of input.
    Linear,
}

impl Plan {
    pub(crate) fn select(tree: &Node) -> Plan {
        if tree.is_anchored_at_start() && !tree.contains_zero_width_repeat() {
            return Plan::SingleAttempt;
        }
        let prefix = tree.literal_prefix();
        if tree.is_pure_literal() && !prefix.is_empty() {
            return Plan::Bmh(prefix);
        }
        if let Some(&first) = prefix.first() {
            return Plan::Memchr(first);
        }
        if let Some(&required) = tree.required_chars().iter().next() {
            return Plan::MemchrRange(required);
        }
        Plan::Linear
    }
}

/// An imported helper: its signature handle and absolute address.
struct Helper {
    sig: SigRef,
    addr: i64,
}

struct Helpers {
    strlen: Helper,
    memchr: Helper,
    bmh: Helper,
    count: Helper,
    trace: Helper,
}

/// Per-compile generation context. Nothing here outlives the compile;
/// concurrent compiles never share a context.
pub(crate) struct Codegen<'a, 'b> {
    builder: &'a mut FunctionBuilder<'b>,
    /// Input pointer (first function parameter).
    arg0: Value,
    start_out: Value,
    end_out: Value,
    /// Input length, computed once in the entry block.
    strlen: Value,
    /// Current cursor into the input.
    index: Variable,
    /// Offset of the attempt in progress; reported as the match start.
    match_start: Variable,
    var_count: usize,
    helpers: Helpers,
    success: Block,
    fail: Block,
}

impl<'a, 'b> Codegen<'a, 'b> {
    /// Builds the whole match function into `builder`. `needle` is the
    /// storage backing the substring-search plan; its address is
    /// embedded into the emitted code, so the caller must keep it alive
    /// for the lifetime of the compiled function.
    pub(crate) fn emit_function(
        builder: &'a mut FunctionBuilder<'b>,
        call_conv: CallConv,
        tree: &Node,
        plan: &Plan,
        needle: Option<&[u8]>,
    ) {
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let params = builder.block_params(entry).to_vec();

        let helpers = Helpers {
            strlen: Helper {
                sig: builder.import_signature(helper_sig(call_conv, &[I64], Some(I64))),
                addr: runtime::rf_strlen as usize as i64,
            },
            memchr: Helper {
                sig: builder.import_signature(helper_sig(call_conv, &[I64, I64, I32], Some(I64))),
                addr: runtime::rf_memchr as usize as i64,
            },
            bmh: Helper {
                sig: builder
                    .import_signature(helper_sig(call_conv, &[I64, I64, I64, I64], Some(I64))),
                addr: runtime::rf_bmh_search as usize as i64,
            },
            count: Helper {
                sig: builder.import_signature(helper_sig(call_conv, &[I64, I64, I32], Some(I64))),
                addr: runtime::rf_count_char as usize as i64,
            },
            trace: Helper {
                sig: builder.import_signature(helper_sig(call_conv, &[I32, I64, I64], None)),
                addr: runtime::rf_trace as usize as i64,
            },
        };

        let index = Variable::new(0);
        builder.declare_var(index, I64);
        let match_start = Variable::new(1);
        builder.declare_var(match_start, I64);
        let zero = builder.ins().iconst(I64, 0);
        builder.def_var(index, zero);
        builder.def_var(match_start, zero);

        let success = builder.create_block();
        let fail = builder.create_block();

        let mut cg = Codegen {
            builder,
            arg0: params[0],
            start_out: params[1],
            end_out: params[2],
            strlen: zero,
            index,
            match_start,
            var_count: 2,
            helpers,
            success,
            fail,
        };
        cg.strlen = cg
            .call_helper_of(|h| &h.strlen, &[params[0]])
            .expect("strlen returns a value");

        debug!(?plan, "emitting match function");
        match plan {
            Plan::SingleAttempt => cg.emit_plan_single_attempt(tree),
            Plan::Bmh(prefix) => {
                let needle = needle.expect("substring plan requires needle storage");
                debug_assert_eq!(needle, &prefix[..]);
                cg.emit_plan_bmh(needle);
            }
            Plan::Memchr(first) => cg.emit_plan_memchr(tree, *first),
            Plan::MemchrRange(required) => cg.emit_plan_memchr_range(tree, *required),
            Plan::Linear => cg.emit_plan_linear(tree),
        }
        cg.emit_epilogue();
    }

    /// Fills the shared terminal blocks: write the bounds, return 1/0.
    fn emit_epilogue(&mut self) {
        self.builder.switch_to_block(self.success);
        let start = self.builder.use_var(self.match_start);
        let start = self.builder.ins().ireduce(I32, start);
        let end = self.builder.use_var(self.index);
        let end = self.builder.ins().ireduce(I32, end);
        self.builder
            .ins()
            .store(MemFlags::trusted(), start, self.start_out, 0);
        self.builder
            .ins()
            .store(MemFlags::trusted(), end, self.end_out, 0);
        let one = self.builder.ins().iconst(I32, 1);
        self.builder.ins().return_(&[one]);

        self.builder.switch_to_block(self.fail);
        let minus_one = self.builder.ins().iconst(I32, i64::from(u32::MAX));
        self.builder
            .ins()
            .store(MemFlags::trusted(), minus_one, self.start_out, 0);
        self.builder
            .ins()
            .store(MemFlags::trusted(), minus_one, self.end_out, 0);
        let zero = self.builder.ins().iconst(I32, 0);
        self.builder.ins().return_(&[zero]);
    }

    // Search plans

    /// Anchored pattern: generate the body once at offset zero.
    fn emit_plan_single_attempt(&mut self, tree: &Node) {
        self.emit_node(tree, self.success, self.fail);
    }

    /// Pure literal: one substring-search call decides the match, and
    /// the hit position gives the bounds directly.
    fn emit_plan_bmh(&mut self, needle: &[u8]) {
        let needle_ptr = self
            .builder
            .ins()
            .iconst(I64, needle.as_ptr() as usize as i64);
        let needle_len = self.builder.ins().iconst(I64, needle.len() as i64);
        let args = [self.arg0, self.strlen, needle_ptr, needle_len];
        let hit = self
            .call_helper_of(|h| &h.bmh, &args)
            .expect("search returns a value");
        let found = self.builder.create_block();
        let ok = self.builder.ins().icmp_imm(IntCC::NotEqual, hit, 0);
        self.builder.ins().brif(ok, found, &[], self.fail, &[]);

        self.builder.switch_to_block(found);
        let offset = self.builder.ins().isub(hit, self.arg0);
        self.builder.def_var(self.match_start, offset);
        let end = self.builder.ins().iadd_imm(offset, needle.len() as i64);
        self.builder.def_var(self.index, end);
        let success = self.success;
        self.builder.ins().jump(success, &[]);
    }

    /// Skip between candidate offsets with memchr on the first literal
    /// byte; the body re-verifies every candidate.
    fn emit_plan_memchr(&mut self, tree: &Node, first: u8) {
        let scan = self.new_var();
        let zero = self.builder.ins().iconst(I64, 0);
        self.builder.def_var(scan, zero);
        let find = self.builder.create_block();
        self.builder.ins().jump(find, &[]);

        self.builder.switch_to_block(find);
        let s = self.builder.use_var(scan);
        let ptr = self.builder.ins().iadd(self.arg0, s);
        let rem = self.builder.ins().isub(self.strlen, s);
        let byte = self.builder.ins().iconst(I32, i64::from(first));
        let hit = self
            .call_helper_of(|h| &h.memchr, &[ptr, rem, byte])
            .expect("memchr returns a value");
        let attempt = self.builder.create_block();
        let ok = self.builder.ins().icmp_imm(IntCC::NotEqual, hit, 0);
        self.builder.ins().brif(ok, attempt, &[], self.fail, &[]);

        self.builder.switch_to_block(attempt);
        let offset = self.builder.ins().isub(hit, self.arg0);
        self.builder.def_var(scan, offset);
        self.builder.def_var(self.index, offset);
        self.builder.def_var(self.match_start, offset);
        let retry = self.builder.create_block();
        self.emit_node(tree, self.success, retry);

        self.builder.switch_to_block(retry);
        let s = self.builder.use_var(scan);
        let next = self.builder.ins().iadd_imm(s, 1);
        self.builder.def_var(scan, next);
        self.builder.ins().jump(find, &[]);
    }

    /// A byte that must occur in any match bounds the candidate offsets:
    /// for each occurrence, attempt every offset not yet tried up to it.
    fn emit_plan_memchr_range(&mut self, tree: &Node, required: u8) {
        let attempt_from = self.new_var();
        let search_from = self.new_var();
        let hit_off = self.new_var();
        let zero = self.builder.ins().iconst(I64, 0);
        self.builder.def_var(attempt_from, zero);
        self.builder.def_var(search_from, zero);
        self.builder.def_var(hit_off, zero);
        let outer = self.builder.create_block();
        self.builder.ins().jump(outer, &[]);

        self.builder.switch_to_block(outer);
        let s = self.builder.use_var(search_from);
        let ptr = self.builder.ins().iadd(self.arg0, s);
        let rem = self.builder.ins().isub(self.strlen, s);
        let byte = self.builder.ins().iconst(I32, i64::from(required));
        let hit = self
            .call_helper_of(|h| &h.memchr, &[ptr, rem, byte])
            .expect("memchr returns a value");
        let found = self.builder.create_block();
        let ok = self.builder.ins().icmp_imm(IntCC::NotEqual, hit, 0);
        self.builder.ins().brif(ok, found, &[], self.fail, &[]);

        self.builder.switch_to_block(found);
        let offset = self.builder.ins().isub(hit, self.arg0);
        self.builder.def_var(hit_off, offset);
        let inner = self.builder.create_block();
        self.builder.ins().jump(inner, &[]);

        self.builder.switch_to_block(inner);
        let a = self.builder.use_var(attempt_from);
        let h = self.builder.use_var(hit_off);
        let within = self
            .builder
            .ins()
            .icmp(IntCC::UnsignedLessThanOrEqual, a, h);
        let attempt = self.builder.create_block();
        let advance = self.builder.create_block();
        self.builder.ins().brif(within, attempt, &[], advance, &[]);

        self.builder.switch_to_block(attempt);
        self.builder.def_var(self.index, a);
        self.builder.def_var(self.match_start, a);
        let retry = self.builder.create_block();
        self.emit_node(tree, self.success, retry);

        self.builder.switch_to_block(retry);
        let a = self.builder.use_var(attempt_from);
        let next = self.builder.ins().iadd_imm(a, 1);
        self.builder.def_var(attempt_from, next);
        self.builder.ins().jump(inner, &[]);

        self.builder.switch_to_block(advance);
        let h = self.builder.use_var(hit_off);
        let next = self.builder.ins().iadd_imm(h, 1);
        self.builder.def_var(search_from, next);
        self.builder.ins().jump(outer, &[]);
    }

    /// Attempt every offset in `0..=strlen`; the inclusive bound lets
    /// zero-width patterns match at end of input.
    fn emit_plan_linear(&mut self, tree: &Node) {
        let head = self.builder.create_block();
        self.builder.ins().jump(head, &[]);

        self.builder.switch_to_block(head);
        let offset = self.builder.use_var(self.match_start);
        let more = self
            .builder
            .ins()
            .icmp(IntCC::UnsignedLessThanOrEqual, offset, self.strlen);
        let attempt = self.builder.create_block();
        self.builder.ins().brif(more, attempt, &[], self.fail, &[]);

        self.builder.switch_to_block(attempt);
        self.builder.def_var(self.index, offset);
        let retry = self.builder.create_block();
        self.emit_node(tree, self.success, retry);

        self.builder.switch_to_block(retry);
        let offset = self.builder.use_var(self.match_start);
        let next = self.builder.ins().iadd_imm(offset, 1);
        self.builder.def_var(self.match_start, next);
        self.builder.ins().jump(head, &[]);
    }

    // Node generation

    /// Emits `node` into the current block. The success and failure
    /// continuations are fixed here, before recursing; the current block
    /// is always terminated when this returns.
    fn emit_node(&mut self, node: &Node, succ: Block, fail: Block) {
        match node {
            Node::Empty => {
                self.builder.ins().jump(succ, &[]);
            }
            Node::Match(b) => self.emit_match_byte(*b, succ, fail),
            Node::Concat(children) => self.emit_concat(children, succ, fail),
            Node::Alternative(branches) => self.emit_alternative(branches, succ, fail),
            Node::Repeat {
                body,
                min,
                max,
                non_greedy,
            } => self.emit_repeat(body, *min, *max, *non_greedy, succ, fail),
            Node::CharClass {
                ranges,
                negated,
                dot,
            } => self.emit_char_class(ranges, *negated, *dot, succ, fail),
            Node::Anchor(kind) => self.emit_anchor(*kind, succ, fail),
        }
    }

    /// Compare the byte under the cursor and advance on a hit. A zero
    /// pattern byte would match the terminator, so only that case needs
    /// the explicit bounds check.
    fn emit_match_byte(&mut self, byte: u8, succ: Block, fail: Block) {
        if byte == 0 {
            let idx = self.builder.use_var(self.index);
            let in_bounds = self
                .builder
                .ins()
                .icmp(IntCC::UnsignedLessThan, idx, self.strlen);
            let test = self.builder.create_block();
            self.builder.ins().brif(in_bounds, test, &[], fail, &[]);
            self.builder.switch_to_block(test);
        }
        let idx = self.builder.use_var(self.index);
        let ch = self.emit_load_byte(idx);
        let ch = self.builder.ins().uextend(I32, ch);
        let eq = self
            .builder
            .ins()
            .icmp_imm(IntCC::Equal, ch, i64::from(byte));
        let advance = self.builder.create_block();
        self.builder.ins().brif(eq, advance, &[], fail, &[]);

        self.builder.switch_to_block(advance);
        let next = self.builder.ins().iadd_imm(idx, 1);
        self.builder.def_var(self.index, next);
        self.builder.ins().jump(succ, &[]);
    }

    /// Membership test over the ranges. The leading bounds check keeps a
    /// negated class from accepting the terminator.
    fn emit_char_class(
        &mut self,
        ranges: &[ClassRange],
        negated: bool,
        dot: bool,
        succ: Block,
        fail: Block,
    ) {
        let idx = self.builder.use_var(self.index);
        let in_bounds = self
            .builder
            .ins()
            .icmp(IntCC::UnsignedLessThan, idx, self.strlen);
        let test = self.builder.create_block();
        self.builder.ins().brif(in_bounds, test, &[], fail, &[]);

        self.builder.switch_to_block(test);
        let idx = self.builder.use_var(self.index);
        let ch = self.emit_load_byte(idx);
        let ch = self.builder.ins().uextend(I32, ch);
        let mut member = if dot {
            let nl = self.builder.ins().icmp_imm(IntCC::Equal, ch, 0x0a);
            let cr = self.builder.ins().icmp_imm(IntCC::Equal, ch, 0x0d);
            let line_end = self.builder.ins().bor(nl, cr);
            self.builder.ins().bxor_imm(line_end, 1)
        } else {
            let mut acc: Option<Value> = None;
            for range in ranges {
                let ge = self.builder.ins().icmp_imm(
                    IntCC::UnsignedGreaterThanOrEqual,
                    ch,
                    i64::from(range.lo),
                );
                let le = self.builder.ins().icmp_imm(
                    IntCC::UnsignedLessThanOrEqual,
                    ch,
                    i64::from(range.hi),
                );
                let mut in_range = self.builder.ins().band(ge, le);
                if !range.included {
                    in_range = self.builder.ins().bxor_imm(in_range, 1);
                }
                acc = Some(match acc {
                    None => in_range,
                    Some(prev) => self.builder.ins().bor(prev, in_range),
                });
            }
            match acc {
                Some(v) => v,
                None => self.builder.ins().iconst(I8, 0),
            }
        };
        if negated {
            member = self.builder.ins().bxor_imm(member, 1);
        }
        let advance = self.builder.create_block();
        self.builder.ins().brif(member, advance, &[], fail, &[]);

        self.builder.switch_to_block(advance);
        let next = self.builder.ins().iadd_imm(idx, 1);
        self.builder.def_var(self.index, next);
        self.builder.ins().jump(succ, &[]);
    }

    /// Zero-width assertions: branch without touching the cursor.
    fn emit_anchor(&mut self, kind: AnchorKind, succ: Block, fail: Block) {
        let idx = self.builder.use_var(self.index);
        match kind {
            AnchorKind::Start => {
                let at_start = self.builder.ins().icmp_imm(IntCC::Equal, idx, 0);
                self.builder.ins().brif(at_start, succ, &[], fail, &[]);
            }
            AnchorKind::End => {
                let at_end = self.builder.ins().icmp(IntCC::Equal, idx, self.strlen);
                self.builder.ins().brif(at_end, succ, &[], fail, &[]);
            }
            AnchorKind::WordBoundary | AnchorKind::NonWordBoundary => {
                // boundary := isword(prev) xor isword(cur), where a
                // missing neighbour (start or end of input) counts as
                // non-word. On empty input both sides are missing, so
                // \b fails and \B holds.
                let prev_word = self.emit_word_lookaround(idx, true);
                let cur_word = self.emit_word_lookaround(idx, false);
                let prev = self.builder.use_var(prev_word);
                let cur = self.builder.use_var(cur_word);
                let mut boundary = self.builder.ins().bxor(prev, cur);
                if kind == AnchorKind::NonWordBoundary {
                    boundary = self.builder.ins().bxor_imm(boundary, 1);
                }
                self.builder.ins().brif(boundary, succ, &[], fail, &[]);
            }
        }
    }

    /// Computes whether the byte before (`before == true`) or under the
    /// cursor is a word character, as a variable holding 0/1; out of
    /// bounds yields 0.
    fn emit_word_lookaround(&mut self, idx: Value, before: bool) -> Variable {
        let result = self.new_var_typed(I8);
        let zero = self.builder.ins().iconst(I8, 0);
        self.builder.def_var(result, zero);
        let present = if before {
            self.builder
                .ins()
                .icmp_imm(IntCC::UnsignedGreaterThan, idx, 0)
        } else {
            self.builder
                .ins()
                .icmp(IntCC::UnsignedLessThan, idx, self.strlen)
        };
        let check = self.builder.create_block();
        let done = self.builder.create_block();
        self.builder.ins().brif(present, check, &[], done, &[]);

        self.builder.switch_to_block(check);
        let at = if before {
            self.builder.ins().iadd_imm(idx, -1)
        } else {
            idx
        };
        let ch = self.emit_load_byte(at);
        let ch = self.builder.ins().uextend(I32, ch);
        let word = self.emit_is_word(ch);
        self.builder.def_var(result, word);
        self.builder.ins().jump(done, &[]);

        self.builder.switch_to_block(done);
        result
    }

    /// `[A-Za-z0-9_]` membership for an i32 byte value.
    fn emit_is_word(&mut self, ch: Value) -> Value {
        let lower = self.emit_in_range(ch, b'a', b'z');
        let upper = self.emit_in_range(ch, b'A', b'Z');
        let digit = self.emit_in_range(ch, b'0', b'9');
        let underscore = self
            .builder
            .ins()
            .icmp_imm(IntCC::Equal, ch, i64::from(b'_'));
        let letter = self.builder.ins().bor(lower, upper);
        let tail = self.builder.ins().bor(digit, underscore);
        self.builder.ins().bor(letter, tail)
    }

    fn emit_in_range(&mut self, ch: Value, lo: u8, hi: u8) -> Value {
        let ge = self
            .builder
            .ins()
            .icmp_imm(IntCC::UnsignedGreaterThanOrEqual, ch, i64::from(lo));
        let le = self
            .builder
            .ins()
            .icmp_imm(IntCC::UnsignedLessThanOrEqual, ch, i64::from(hi));
        self.builder.ins().band(ge, le)
    }

    /// Chain the children through fresh blocks; each consuming child
    /// advances the cursor itself.
    fn emit_concat(&mut self, children: &[Node], succ: Block, fail: Block) {
        if children.is_empty() {
            self.builder.ins().jump(succ, &[]);
            return;
        }
        let last = children.len() - 1;
        for (i, child) in children.iter().enumerate() {
            if i == last {
                self.emit_node(child, succ, fail);
            } else {
                let next = self.builder.create_block();
                self.emit_node(child, next, fail);
                self.builder.switch_to_block(next);
            }
        }
    }

    /// Ordered choice: each failing branch restores the cursor saved at
    /// entry and falls through to the next; the last branch fails to the
    /// overall failure continuation.
    fn emit_alternative(&mut self, branches: &[Node], succ: Block, fail: Block) {
        if branches.is_empty() {
            self.builder.ins().jump(fail, &[]);
            return;
        }
        let saved = self.new_var();
        let idx = self.builder.use_var(self.index);
        self.builder.def_var(saved, idx);
        let last = branches.len() - 1;
        for (i, branch) in branches.iter().enumerate() {
            if i == last {
                self.emit_node(branch, succ, fail);
            } else {
                let restore = self.builder.create_block();
                self.emit_node(branch, succ, restore);
                self.builder.switch_to_block(restore);
                let entry_idx = self.builder.use_var(saved);
                self.builder.def_var(self.index, entry_idx);
            }
        }
    }

    fn emit_repeat(
        &mut self,
        body: &Node,
        min: u32,
        max: Option<u32>,
        non_greedy: bool,
        succ: Block,
        fail: Block,
    ) {
        if max == Some(0) {
            self.builder.ins().jump(succ, &[]);
            return;
        }
        // Zero-width bodies are rejected by the parser; for trees built
        // by hand, a single attempt (or none) preserves the semantics
        // without looping.
        if body.is_zero_width() {
            if min == 0 {
                self.builder.ins().jump(succ, &[]);
            } else {
                self.emit_node(body, succ, fail);
            }
            return;
        }
        if let (Some(byte), false) = (body.single_char(), non_greedy) {
            self.emit_repeat_run_length(byte, min, max, succ, fail);
        } else {
            self.emit_repeat_general(body, min, max, non_greedy, succ, fail);
        }
    }

    /// Greedy single-byte repeat: one run-length call replaces the loop.
    /// Nothing is consumed on failure, so there is no cursor to restore.
    fn emit_repeat_run_length(
        &mut self,
        byte: u8,
        min: u32,
        max: Option<u32>,
        succ: Block,
        fail: Block,
    ) {
        let idx = self.builder.use_var(self.index);
        let ptr = self.builder.ins().iadd(self.arg0, idx);
        let rem = self.builder.ins().isub(self.strlen, idx);
        let target = self.builder.ins().iconst(I32, i64::from(byte));
        let run = self
            .call_helper_of(|h| &h.count, &[ptr, rem, target])
            .expect("run-length count returns a value");
        if cfg!(debug_assertions) {
            let tag = self.builder.ins().iconst(I32, i64::from(TRACE_RUN_LENGTH));
            self.call_helper_of(|h| &h.trace, &[tag, idx, run]);
        }
        // min == 0 always has enough and stays in the current block.
        if min > 0 {
            let enough = self.builder.ins().icmp_imm(
                IntCC::UnsignedGreaterThanOrEqual,
                run,
                i64::from(min),
            );
            let take_block = self.builder.create_block();
            self.builder.ins().brif(enough, take_block, &[], fail, &[]);
            self.builder.switch_to_block(take_block);
        }
        let take = match max {
            None => run,
            Some(m) => {
                let cap = self.builder.ins().iconst(I64, i64::from(m));
                let below = self.builder.ins().icmp(IntCC::UnsignedLessThan, run, cap);
                self.builder.ins().select(below, run, cap)
            }
        };
        let idx = self.builder.use_var(self.index);
        let next = self.builder.ins().iadd(idx, take);
        self.builder.def_var(self.index, next);
        self.builder.ins().jump(succ, &[]);
    }

    /// Two-phase counted loop: the mandatory phase runs the body `min`
    /// times, the optional phase keeps consuming while the body succeeds
    /// (bounded by `max`). A non-greedy repeat stops after the mandatory
    /// phase; the emitted code does not backtrack into earlier
    /// quantifiers.
    fn emit_repeat_general(
        &mut self,
        body: &Node,
        min: u32,
        max: Option<u32>,
        non_greedy: bool,
        succ: Block,
        fail: Block,
    ) {
        let entry_saved = self.new_var();
        let count = self.new_var();
        let idx = self.builder.use_var(self.index);
        self.builder.def_var(entry_saved, idx);
        let zero = self.builder.ins().iconst(I64, 0);
        self.builder.def_var(count, zero);

        let optional = self.builder.create_block();
        if min > 0 {
            let mandatory = self.builder.create_block();
            self.builder.ins().jump(mandatory, &[]);

            self.builder.switch_to_block(mandatory);
            let c = self.builder.use_var(count);
            let more = self
                .builder
                .ins()
                .icmp_imm(IntCC::UnsignedLessThan, c, i64::from(min));
            let iteration = self.builder.create_block();
            self.builder.ins().brif(more, iteration, &[], optional, &[]);

            self.builder.switch_to_block(iteration);
            let advance = self.builder.create_block();
            let rewind = self.builder.create_block();
            self.emit_node(body, advance, rewind);

            self.builder.switch_to_block(advance);
            let c = self.builder.use_var(count);
            let next = self.builder.ins().iadd_imm(c, 1);
            self.builder.def_var(count, next);
            self.builder.ins().jump(mandatory, &[]);

            self.builder.switch_to_block(rewind);
            let entry_idx = self.builder.use_var(entry_saved);
            self.builder.def_var(self.index, entry_idx);
            self.builder.ins().jump(fail, &[]);
        } else {
            self.builder.ins().jump(optional, &[]);
        }

        self.builder.switch_to_block(optional);
        if non_greedy {
            // Consume the minimum and yield to the continuation.
            self.builder.ins().jump(succ, &[]);
            return;
        }
        let attempt = self.builder.create_block();
        if let Some(m) = max {
            let c = self.builder.use_var(count);
            let below = self
                .builder
                .ins()
                .icmp_imm(IntCC::UnsignedLessThan, c, i64::from(m));
            self.builder.ins().brif(below, attempt, &[], succ, &[]);
        } else {
            self.builder.ins().jump(attempt, &[]);
        }

        self.builder.switch_to_block(attempt);
        let iter_saved = self.new_var();
        let idx = self.builder.use_var(self.index);
        self.builder.def_var(iter_saved, idx);
        let consumed = self.builder.create_block();
        let rewind = self.builder.create_block();
        self.emit_node(body, consumed, rewind);

        self.builder.switch_to_block(consumed);
        // A successful iteration that consumed nothing cannot make
        // progress; exit instead of looping.
        let now = self.builder.use_var(self.index);
        let before = self.builder.use_var(iter_saved);
        let progressed = self.builder.ins().icmp(IntCC::NotEqual, now, before);
        let continue_loop = self.builder.create_block();
        self.builder
            .ins()
            .brif(progressed, continue_loop, &[], succ, &[]);

        self.builder.switch_to_block(continue_loop);
        let c = self.builder.use_var(count);
        let next = self.builder.ins().iadd_imm(c, 1);
        self.builder.def_var(count, next);
        self.builder.ins().jump(optional, &[]);

        self.builder.switch_to_block(rewind);
        let saved_idx = self.builder.use_var(iter_saved);
        self.builder.def_var(self.index, saved_idx);
        self.builder.ins().jump(succ, &[]);
    }

    // Shared emission helpers

    fn emit_load_byte(&mut self, idx: Value) -> Value {
        let addr = self.builder.ins().iadd(self.arg0, idx);
        self.builder.ins().load(I8, MemFlags::trusted(), addr, 0)
    }

    /// Calls a native helper through its absolute address embedded as a
    /// constant pointer; no symbol resolution is involved.
    fn call_helper_of(
        &mut self,
        pick: impl Fn(&Helpers) -> &Helper,
        args: &[Value],
    ) -> Option<Value> {
        let helper = pick(&self.helpers);
        let (sig, addr) = (helper.sig, helper.addr);
        let callee = self.builder.ins().iconst(I64, addr);
        let call = self.builder.ins().call_indirect(sig, callee, args);
        self.builder.inst_results(call).first().copied()
    }

    fn new_var(&mut self) -> Variable {
        self.new_var_typed(I64)
    }

    fn new_var_typed(&mut self, ty: cranelift_codegen::ir::Type) -> Variable {
        let var = Variable::new(self.var_count);
        self.var_count += 1;
        self.builder.declare_var(var, ty);
        var
    }
}

fn helper_sig(call_conv: CallConv, params: &[cranelift_codegen::ir::Type], ret: Option<cranelift_codegen::ir::Type>) -> Signature {
    let mut sig = Signature::new(call_conv);
    sig.params
        .extend(params.iter().map(|&ty| AbiParam::new(ty)));
    if let Some(ty) = ret {
        sig.returns.push(AbiParam::new(ty));
    }
    sig
}
