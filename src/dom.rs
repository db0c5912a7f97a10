//! Dominator and post-dominator analysis.
//!
//! Iterative intersection over a reverse post-order, per Cooper, Harvey
//! and Kennedy. The recognizer leans on two products: loop membership that
//! survives the irregular edges `break`/`continue`/exceptions introduce,
//! and nearest common post-dominators for branch merge points.

use std::collections::HashMap;

use bitvec::prelude::*;

use crate::cfg::{BlockId, Cfg, EdgeKind};

/// Immediate-dominator tree over all edges of the graph.
#[derive(Debug, Clone)]
pub struct DomTree {
    idom: Vec<Option<BlockId>>,
    depth: Vec<u32>,
}

fn reverse_post_order(cfg: &Cfg, include_exception: bool) -> Vec<BlockId> {
    let n = cfg.blocks.len();
    let mut visited = bitvec![0; n];
    let mut postorder = Vec::with_capacity(n);
    if n == 0 {
        return postorder;
    }
    // Iterative DFS; the second stack element tracks the next successor
    // index to visit.
    let mut stack: Vec<(BlockId, usize)> = vec![(0, 0)];
    visited.set(0, true);
    while let Some(&(block, next)) = stack.last() {
        let successors = &cfg.block(block).successors;
        let mut pushed = false;
        let mut index = next;
        while index < successors.len() {
            let edge = successors[index];
            index += 1;
            if !include_exception && edge.kind == EdgeKind::Exception {
                continue;
            }
            if !visited[edge.target as usize] {
                visited.set(edge.target as usize, true);
                stack.last_mut().expect("stack is non-empty").1 = index;
                stack.push((edge.target, 0));
                pushed = true;
                break;
            }
        }
        if !pushed {
            postorder.push(block);
            stack.pop();
        }
    }
    postorder.reverse();
    postorder
}

fn intersect(idom: &[Option<BlockId>], order: &HashMap<BlockId, usize>, a: BlockId, b: BlockId) -> BlockId {
    let mut a = a;
    let mut b = b;
    while a != b {
        while order[&a] > order[&b] {
            a = idom[a as usize].expect("processed block has idom");
        }
        while order[&b] > order[&a] {
            b = idom[b as usize].expect("processed block has idom");
        }
    }
    a
}

impl DomTree {
    /// Compute immediate dominators for every reachable block.
    #[must_use]
    pub fn dominators(cfg: &Cfg) -> Self {
        let n = cfg.blocks.len();
        let mut idom: Vec<Option<BlockId>> = vec![None; n];
        if n == 0 {
            return Self {
                idom,
                depth: Vec::new(),
            };
        }
        let rpo = reverse_post_order(cfg, true);
        let order: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();
        idom[0] = Some(0);
        let mut changed = true;
        while changed {
            changed = false;
            for &block in rpo.iter().skip(1) {
                let mut new_idom: Option<BlockId> = None;
                for &pred in &cfg.block(block).predecessors {
                    if idom[pred as usize].is_none() || !order.contains_key(&pred) {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pred,
                        Some(current) => intersect(&idom, &order, pred, current),
                    });
                }
                if new_idom.is_some() && idom[block as usize] != new_idom {
                    idom[block as usize] = new_idom;
                    changed = true;
                }
            }
        }
        let mut tree = Self {
            idom,
            depth: vec![0; n],
        };
        for &block in &rpo {
            if block != 0 {
                if let Some(parent) = tree.idom[block as usize] {
                    tree.depth[block as usize] = tree.depth[parent as usize] + 1;
                }
            }
        }
        tree
    }

    #[must_use]
    pub fn immediate_dom(&self, block: BlockId) -> Option<BlockId> {
        if block == 0 {
            return None;
        }
        self.idom.get(block as usize).copied().flatten()
    }

    #[must_use]
    pub fn is_reachable(&self, block: BlockId) -> bool {
        block == 0 || self.idom.get(block as usize).is_some_and(Option::is_some)
    }

    /// Whether `a` dominates `b` (reflexively).
    #[must_use]
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        if !self.is_reachable(b) {
            return false;
        }
        let mut cursor = b;
        loop {
            if cursor == a {
                return true;
            }
            if cursor == 0 {
                return false;
            }
            match self.idom[cursor as usize] {
                Some(parent) if parent != cursor => cursor = parent,
                _ => return false,
            }
        }
    }
}

/// Post-dominator tree over non-exception edges, rooted at a virtual exit
/// joining every terminal block.
#[derive(Debug, Clone)]
pub struct PostDomTree {
    /// Immediate post-dominator; `virtual_exit` is `blocks.len()`.
    ipdom: Vec<Option<BlockId>>,
    depth: Vec<u32>,
    virtual_exit: BlockId,
}

impl PostDomTree {
    #[must_use]
    pub fn post_dominators(cfg: &Cfg) -> Self {
        let n = cfg.blocks.len();
        let virtual_exit = n as BlockId;
        let mut ipdom: Vec<Option<BlockId>> = vec![None; n + 1];
        let mut depth = vec![0u32; n + 1];
        if n == 0 {
            return Self {
                ipdom,
                depth,
                virtual_exit,
            };
        }

        // Reversed-graph adjacency: a block's predecessors in the
        // reversed graph are its successors in the original one, and
        // terminal blocks hang off the virtual exit.
        let mut rev_preds: Vec<Vec<BlockId>> = vec![Vec::new(); n + 1];
        for block in &cfg.blocks {
            let mut terminal = true;
            for edge in &block.successors {
                if edge.kind == EdgeKind::Exception {
                    continue;
                }
                terminal = false;
                rev_preds[block.id as usize].push(edge.target);
            }
            if terminal {
                rev_preds[block.id as usize].push(virtual_exit);
            }
        }

        // Post-order of the reversed graph from the virtual exit.
        let forward = reverse_post_order(cfg, false);
        let mut order_list: Vec<BlockId> = vec![virtual_exit];
        // Approximate reversed-RPO by reversing the forward RPO; iteration
        // to fixpoint below makes the result exact regardless.
        order_list.extend(forward.iter().rev().copied());
        let order: HashMap<BlockId, usize> = order_list
            .iter()
            .enumerate()
            .map(|(i, &b)| (b, i))
            .collect();

        ipdom[virtual_exit as usize] = Some(virtual_exit);
        let mut changed = true;
        while changed {
            changed = false;
            for &block in order_list.iter().skip(1) {
                let mut new_ipdom: Option<BlockId> = None;
                for &succ in &rev_preds[block as usize] {
                    if ipdom[succ as usize].is_none() || !order.contains_key(&succ) {
                        continue;
                    }
                    new_ipdom = Some(match new_ipdom {
                        None => succ,
                        Some(current) => intersect(&ipdom, &order, succ, current),
                    });
                }
                if new_ipdom.is_some() && ipdom[block as usize] != new_ipdom {
                    ipdom[block as usize] = new_ipdom;
                    changed = true;
                }
            }
        }
        // Depth by chain walking; the chain of every exit-reaching block
        // terminates at the virtual exit.
        for block in 0..=n {
            let mut steps = 0u32;
            let mut cursor = block as BlockId;
            while let Some(parent) = ipdom[cursor as usize] {
                if parent == cursor || steps > n as u32 + 1 {
                    break;
                }
                steps += 1;
                cursor = parent;
            }
            depth[block] = steps;
        }
        Self {
            ipdom,
            depth,
            virtual_exit,
        }
    }

    #[must_use]
    pub fn immediate_post_dom(&self, block: BlockId) -> Option<BlockId> {
        let parent = (*self.ipdom.get(block as usize)?)?;
        (parent != self.virtual_exit).then_some(parent)
    }

    /// Nearest common post-dominator of two branches, or `None` when both
    /// are terminal.
    #[must_use]
    pub fn merge(&self, a: BlockId, b: BlockId) -> Option<BlockId> {
        let mut a = a;
        let mut b = b;
        if self.ipdom.get(a as usize)?.is_none() || self.ipdom.get(b as usize)?.is_none() {
            return None;
        }
        while a != b {
            while self.depth[a as usize] > self.depth[b as usize] {
                a = self.ipdom[a as usize]?;
            }
            while self.depth[b as usize] > self.depth[a as usize] {
                b = self.ipdom[b as usize]?;
            }
            if a != b {
                a = self.ipdom[a as usize]?;
                b = self.ipdom[b as usize]?;
            }
        }
        (a != self.virtual_exit).then_some(a)
    }
}

/// Natural-loop membership, one bitset per header.
#[derive(Debug, Clone, Default)]
pub struct LoopInfo {
    headers: Vec<BlockId>,
    bodies: HashMap<BlockId, BitVec>,
}

impl LoopInfo {
    /// Find every natural loop: a back-edge `s → h` where `h` dominates
    /// `s` induces a loop at `h` whose body is everything that reaches
    /// `s` without leaving `h`'s dominance region.
    #[must_use]
    pub fn compute(cfg: &Cfg, dom: &DomTree) -> Self {
        let n = cfg.blocks.len();
        let mut info = Self::default();
        for block in &cfg.blocks {
            for edge in &block.successors {
                if edge.kind == EdgeKind::Exception {
                    continue;
                }
                let header = edge.target;
                if !dom.dominates(header, block.id) {
                    continue;
                }
                let body = info
                    .bodies
                    .entry(header)
                    .or_insert_with(|| bitvec![0; n]);
                body.set(header as usize, true);
                // Backward walk from the latch, constrained to the
                // dominance region of the header.
                let mut stack = vec![block.id];
                while let Some(current) = stack.pop() {
                    if body[current as usize] {
                        continue;
                    }
                    if !dom.dominates(header, current) {
                        continue;
                    }
                    body.set(current as usize, true);
                    for &pred in &cfg.block(current).predecessors {
                        stack.push(pred);
                    }
                }
                if !info.headers.contains(&header) {
                    info.headers.push(header);
                }
            }
        }
        info.headers.sort_unstable();
        info
    }

    #[must_use]
    pub fn headers(&self) -> &[BlockId] {
        &self.headers
    }

    #[must_use]
    pub fn body(&self, header: BlockId) -> Option<&BitVec> {
        self.bodies.get(&header)
    }

    #[must_use]
    pub fn is_in_loop(&self, block: BlockId, header: BlockId) -> bool {
        self.bodies
            .get(&header)
            .is_some_and(|body| body.get(block as usize).map(|b| *b).unwrap_or(false))
    }

    /// The innermost loop containing `block`, by smallest body.
    #[must_use]
    pub fn innermost_containing(&self, block: BlockId) -> Option<BlockId> {
        self.headers
            .iter()
            .copied()
            .filter(|&h| self.is_in_loop(block, h))
            .min_by_key(|&h| self.bodies[&h].count_ones())
    }
}
