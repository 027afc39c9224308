pub const SLOTS: &str = r#"Candidate slots for a {{ duration_minutes }} minute meeting ({{ since }} - {{ until }}, {{ tz }}):
{% if slots|length == 0 %}
(No common free time found)
{% else %}
{% for slot in slots %}
{{ slot.slot_id + 1 }}. {{ slot.start }} - {{ slot.end }}
  - Confidence: {{ slot.confidence }}
  - Within working hours: {{ "yes" if slot.within_working_hours else "no" }}
  {% if slot.conflicts|length > 0 %}
  - Outside hours for: {{ slot.conflicts|join(", ") }}
  {% endif %}
{% endfor %}
{% endif %}
"#;

pub const NEGOTIATION: &str = r#"Negotiation for "{{ title }}": {{ status }}
{% if final_slot %}
Final time: {{ final_slot }}
{% endif %}
{% if reason %}
Reason: {{ reason }}
{% endif %}
Rounds completed: {{ rounds }}
Confidence: {{ confidence }}
{% for entry in history %}
- [round {{ entry.round }}] {{ entry.agent }}: {{ entry.action }}
{% endfor %}
{% for recipient, message in messages|items %}

=== {{ recipient }} ({{ message.kind }}) ===
Subject: {{ message.subject }}

{{ message.body }}
{% endfor %}
"#;
