//! WGSL compute kernels for the census backend
//!
//! Shared conventions:
//! - A sequence record is 8 `u32` words: words 0..7 hold symbol bytes
//!   little-endian (byte `i` of the sequence is byte `i % 4` of word `i / 4`),
//!   word 7 holds the ply.
//! - A 54-bit code travels as `vec2<u32>(lo, hi)`: X mask in bits 0..27, O mask
//!   in bits 27..54.
//! - Dispatches are 2D so batches beyond 65535 workgroups still fit; the flat
//!   index is `gid.x + gid.y * num_workgroups.x * 64`.

/// Threads per workgroup, shared by every kernel
pub const WORKGROUP_SIZE: u32 = 64;

/// Occupancy signature of each sequence record.
pub const SIGNATURE_SHADER: &str = r#"
struct Params {
    count: u32,
    ply: u32,
    extra: u32,
    _reserved: u32,
}

@group(0) @binding(0) var<storage, read> seqs: array<u32>;
@group(0) @binding(1) var<storage, read_write> codes: array<vec2<u32>>;
@group(0) @binding(2) var<uniform> params: Params;

// (cell, is_x) for an alphabet byte; '.' and ',' are cell 26
fn decode_symbol(sym: u32) -> vec2<u32> {
    if (sym >= 65u && sym <= 90u) {
        return vec2<u32>(sym - 65u, 1u);
    }
    if (sym >= 97u && sym <= 122u) {
        return vec2<u32>(sym - 97u, 0u);
    }
    if (sym == 46u) {
        return vec2<u32>(26u, 1u);
    }
    return vec2<u32>(26u, 0u);
}

fn symbol_at(base: u32, i: u32) -> u32 {
    let word = seqs[base + i / 4u];
    return (word >> ((i % 4u) * 8u)) & 0xFFu;
}

@compute @workgroup_size(64)
fn compute_signature(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let idx = gid.x + gid.y * groups.x * 64u;
    if (idx >= params.count) {
        return;
    }
    let base = idx * 8u;
    let ply = min(seqs[base + 7u], 27u);
    var x = 0u;
    var o = 0u;
    for (var i = 0u; i < ply; i = i + 1u) {
        let d = decode_symbol(symbol_at(base, i));
        if (d.y == 1u) {
            x = x | (1u << d.x);
        } else {
            o = o | (1u << d.x);
        }
    }
    codes[idx] = vec2<u32>(x | (o << 27u), o >> 5u);
}
"#;

/// Orbit minimum of each code over the rotation maps.
pub const ROTATION_SHADER: &str = r#"
struct Params {
    count: u32,
    ply: u32,
    extra: u32,      // number of rotation maps
    _reserved: u32,
}

@group(0) @binding(0) var<storage, read> codes: array<vec2<u32>>;
@group(0) @binding(1) var<storage, read> maps: array<u32>;
@group(0) @binding(2) var<storage, read_write> keys: array<vec2<u32>>;
@group(0) @binding(3) var<uniform> params: Params;

const CELL_MASK: u32 = 0x7FFFFFFu;

fn remap(mask: u32, rotation: u32) -> u32 {
    var out = 0u;
    for (var i = 0u; i < 27u; i = i + 1u) {
        if (((mask >> i) & 1u) == 1u) {
            out = out | (1u << maps[rotation * 27u + i]);
        }
    }
    return out;
}

fn rotated(x: u32, o: u32, rotation: u32) -> vec2<u32> {
    let rx = remap(x, rotation);
    let ro = remap(o, rotation);
    return vec2<u32>(rx | (ro << 27u), ro >> 5u);
}

fn less(a: vec2<u32>, b: vec2<u32>) -> bool {
    return a.y < b.y || (a.y == b.y && a.x < b.x);
}

@compute @workgroup_size(64)
fn compute_rotation_key(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let idx = gid.x + gid.y * groups.x * 64u;
    if (idx >= params.count) {
        return;
    }
    let code = codes[idx];
    let x = code.x & CELL_MASK;
    let o = ((code.x >> 27u) | (code.y << 5u)) & CELL_MASK;
    var best = rotated(x, o, 0u);
    for (var r = 1u; r < params.extra; r = r + 1u) {
        let candidate = rotated(x, o, r);
        if (less(candidate, best)) {
            best = candidate;
        }
    }
    keys[idx] = best;
}
"#;

/// Line test of each code; outcome 0 ongoing, 1 X, 2 O, 3 draw.
pub const CLASSIFY_SHADER: &str = r#"
struct Params {
    count: u32,
    ply: u32,
    extra: u32,      // number of line masks
    _reserved: u32,
}

@group(0) @binding(0) var<storage, read> codes: array<vec2<u32>>;
@group(0) @binding(1) var<storage, read> lines: array<u32>;
@group(0) @binding(2) var<storage, read_write> outcomes: array<u32>;
@group(0) @binding(3) var<storage, read_write> counters: array<atomic<u32>, 4>;
@group(0) @binding(4) var<uniform> params: Params;

const CELL_MASK: u32 = 0x7FFFFFFu;

fn owns_any(mask: u32) -> bool {
    for (var i = 0u; i < params.extra; i = i + 1u) {
        let line = lines[i];
        if ((mask & line) == line) {
            return true;
        }
    }
    return false;
}

@compute @workgroup_size(64)
fn compute_outcome(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let idx = gid.x + gid.y * groups.x * 64u;
    if (idx >= params.count) {
        return;
    }
    let code = codes[idx];
    let x = code.x & CELL_MASK;
    let o = ((code.x >> 27u) | (code.y << 5u)) & CELL_MASK;
    var outcome = 0u;
    if (owns_any(x)) {
        outcome = 1u;
    } else if (owns_any(o)) {
        outcome = 2u;
    } else if (params.ply >= 27u) {
        outcome = 3u;
    }
    outcomes[idx] = outcome;
    atomicAdd(&counters[outcome], 1u);
}
"#;

/// One child slot per (parent, cell); a slot with ply word 0 holds no child.
pub const EXPAND_SHADER: &str = r#"
struct Params {
    count: u32,
    ply: u32,
    extra: u32,
    _reserved: u32,
}

@group(0) @binding(0) var<storage, read> parents: array<u32>;
@group(0) @binding(1) var<storage, read_write> children: array<u32>;
@group(0) @binding(2) var<storage, read_write> produced: array<atomic<u32>, 1>;
@group(0) @binding(3) var<uniform> params: Params;

fn cell_of(sym: u32) -> u32 {
    if (sym >= 65u && sym <= 90u) {
        return sym - 65u;
    }
    if (sym >= 97u && sym <= 122u) {
        return sym - 97u;
    }
    return 26u;
}

fn symbol_for(cell: u32, x_to_move: bool) -> u32 {
    if (cell == 26u) {
        return select(44u, 46u, x_to_move);
    }
    return select(97u + cell, 65u + cell, x_to_move);
}

@compute @workgroup_size(64)
fn compute_children(
    @builtin(global_invocation_id) gid: vec3<u32>,
    @builtin(num_workgroups) groups: vec3<u32>,
) {
    let idx = gid.x + gid.y * groups.x * 64u;
    if (idx >= params.count) {
        return;
    }
    let base = idx * 8u;
    let ply = parents[base + 7u];
    var occupied = 0u;
    for (var i = 0u; i < min(ply, 27u); i = i + 1u) {
        let sym = (parents[base + i / 4u] >> ((i % 4u) * 8u)) & 0xFFu;
        occupied = occupied | (1u << cell_of(sym));
    }
    let x_to_move = (ply % 2u) == 0u;
    let word = ply / 4u;
    let shift = (ply % 4u) * 8u;

    for (var cell = 0u; cell < 27u; cell = cell + 1u) {
        let slot = (idx * 27u + cell) * 8u;
        if (ply >= 27u || ((occupied >> cell) & 1u) == 1u) {
            children[slot + 7u] = 0u;
            continue;
        }
        for (var w = 0u; w < 7u; w = w + 1u) {
            children[slot + w] = parents[base + w];
        }
        let cleared = children[slot + word] & ~(0xFFu << shift);
        children[slot + word] = cleared | (symbol_for(cell, x_to_move) << shift);
        children[slot + 7u] = ply + 1u;
        atomicAdd(&produced[0], 1u);
    }
}
"#;
