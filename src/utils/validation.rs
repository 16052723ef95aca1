use validator::ValidateEmail;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;
pub const MAX_NOTE_LEN: usize = 2000;

pub fn validate_email(email: &str) -> Result<(), String> {
    if email.validate_email() {
        Ok(())
    } else {
        Err("Invalid email address".to_string())
    }
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        ));
    }
    if password.len() > MAX_PASSWORD_LEN {
        return Err(format!(
            "Password must be at most {} characters",
            MAX_PASSWORD_LEN
        ));
    }
    Ok(())
}

/// Storage object names are issued by this backend under the "meals/"
/// prefix. Anything else (or anything that smells like path traversal)
/// is rejected before it reaches the cache or the vision service.
pub fn validate_blob_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("Object name must not be empty".to_string());
    }
    if !name.starts_with("meals/") {
        return Err("Object name must start with 'meals/'".to_string());
    }
    if name.contains("..") || name.contains('\\') {
        return Err("Object name contains invalid characters".to_string());
    }
    if name.len() > 512 {
        return Err("Object name too long".to_string());
    }
    Ok(())
}

pub fn validate_note(note: &str) -> Result<(), String> {
    if note.len() > MAX_NOTE_LEN {
        return Err(format!("Note must be at most {} characters", MAX_NOTE_LEN));
    }
    Ok(())
}
