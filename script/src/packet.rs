//! The `packet` userdata handed to a predicate function: a read-only,
//! bounds-checked view over one packet's bytes, valid only for the Lua call
//! that received it.

use mlua::{UserData, UserDataMethods};

pub struct LuaPacket<'a>(pub &'a [u8]);

fn read(bytes: &[u8], offset: i64, width: usize) -> mlua::Result<&[u8]> {
    if offset < 0 {
        return Err(mlua::Error::RuntimeError("read offset excessive".into()));
    }
    let offset = offset as usize;
    if offset.checked_add(width).is_none_or(|end| end > bytes.len()) {
        return Err(mlua::Error::RuntimeError("read offset excessive".into()));
    }
    Ok(&bytes[offset..offset + width])
}

impl<'a> UserData for LuaPacket<'a> {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method("length", |_, this, ()| Ok(this.0.len() as i64));

        methods.add_method("read8", |_, this, offset: i64| {
            let b = read(this.0, offset, 1)?;
            Ok(b[0] as i64)
        });
        methods.add_method("read16be", |_, this, offset: i64| {
            let b = read(this.0, offset, 2)?;
            Ok(u16::from_be_bytes([b[0], b[1]]) as i64)
        });
        methods.add_method("read16le", |_, this, offset: i64| {
            let b = read(this.0, offset, 2)?;
            Ok(u16::from_le_bytes([b[0], b[1]]) as i64)
        });
        methods.add_method("read32be", |_, this, offset: i64| {
            let b = read(this.0, offset, 4)?;
            Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]) as i64)
        });
        methods.add_method("read32le", |_, this, offset: i64| {
            let b = read(this.0, offset, 4)?;
            Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]) as i64)
        });
        methods.add_method("read64be", |_, this, offset: i64| {
            let b = read(this.0, offset, 8)?;
            let mut a = [0u8; 8];
            a.copy_from_slice(b);
            Ok(u64::from_be_bytes(a) as i64)
        });
        methods.add_method("read64le", |_, this, offset: i64| {
            let b = read(this.0, offset, 8)?;
            let mut a = [0u8; 8];
            a.copy_from_slice(b);
            Ok(u64::from_le_bytes(a) as i64)
        });
    }
}
