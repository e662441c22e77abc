/*! Relocates a module's functions into a [`crate::sandbox::Sandbox`] and
serialises their instructions to bytes. Grounded on
`examples/original_source/src/transform/generator.cpp`'s three free
functions — `pickAddressesInSandbox`, `copyCodeToSandbox`, `jumpToSandbox` —
kept here as methods on one [`Generator`] since none of them carry state
across calls in the original either.
*/

use std::ffi::CString;
use std::io::{Cursor, Seek, SeekFrom};
use std::os::raw::{c_char, c_int};

use crate::chunk::{Arena, ChunkId};
use crate::error::RewriterError;
use crate::mutator::Mutator;
use crate::sandbox::SandboxAllocator;
use crate::sandbox::Sandbox;

pub struct Generator;

impl Generator {
    /// `pickAddressesInSandbox`: allocate a slot sized to each function's
    /// current size and rebase its `Absolute` position onto it. Every
    /// descendant's address follows from the position algebra the next time
    /// it is queried — no explicit per-instruction rewrite is needed.
    pub fn pick_addresses_in_sandbox(
        arena: &mut Arena,
        module: ChunkId,
        sandbox: &mut Sandbox,
    ) -> Result<(), RewriterError> {
        let functions = arena.children(module).to_vec();
        for function in functions {
            let size = arena.size(function);
            let slot = sandbox.allocate(size)?;
            Mutator::new(arena, function).set_position(slot.address())?;
        }
        Ok(())
    }

    /// `copyCodeToSandbox`: walk every function's blocks and instructions in
    /// order, writing each semantic's bytes at the cursor position implied
    /// by the function's assigned address. The written region's address
    /// matches `arena.address(function)` by construction, since the cursor
    /// starts there and every semantic advances it by exactly its own
    /// reported size.
    pub fn copy_code_to_sandbox(
        arena: &Arena,
        module: ChunkId,
        sandbox: &mut Sandbox,
    ) -> Result<(), RewriterError> {
        let base = sandbox.backing().base_address();
        let mut cursor = Cursor::new(sandbox.backing_mut().as_mut_slice());

        for &function in arena.children(module) {
            cursor.seek(SeekFrom::Start(arena.address(function) - base))?;
            for &block in arena.children(function) {
                for &instr in arena.children(block) {
                    if let Some(semantic) = arena.semantic(instr) {
                        semantic.write_to(&mut cursor)?;
                    }
                }
            }
        }
        Ok(())
    }

    /// `jumpToSandbox`: resolve `name` through the module's alias map and
    /// call it as a `main`-shaped function pointer. `None` if the name isn't
    /// a known function, matching the C++'s `if(!f) return;` early exit.
    ///
    /// # Safety
    /// The caller must have made the sandbox's backing memory executable
    /// (e.g. via `mprotect`/`VirtualProtect`) before calling this — this
    /// crate performs no such mapping itself (`spec.md` §4.F: JIT execution
    /// beyond "call a function pointer" is out of scope). Calling through an
    /// address that does not hold a valid `fn(c_int, *const *const c_char)
    /// -> c_int` is undefined behaviour.
    pub unsafe fn jump_to_sandbox(arena: &Arena, module: ChunkId, name: &str) -> Option<c_int> {
        let target = arena.kind(module).as_module()?.function_alias_map.get(name)?;
        let address = arena.address(*target);

        let argv0 = CString::new("/dev/null").expect("no interior NUL");
        let argv: [*const c_char; 2] = [argv0.as_ptr(), std::ptr::null()];

        let entry: unsafe extern "C" fn(c_int, *const *const c_char) -> c_int =
            std::mem::transmute(address as usize);
        Some(entry(1, argv.as_ptr()))
    }
}
